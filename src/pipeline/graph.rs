//! DAG validation and topological ordering, per SPEC_FULL.md §4.F step 1-2.

use super::node::{is_sentinel, NodeSpec};
use crate::error::EngineError;
use std::collections::{HashMap, HashSet, VecDeque};

/// A validated, topologically-ordered pipeline graph. Holds nothing but
/// the declaration order to execute nodes in; the executor looks node
/// specs back up by id as it walks this order.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub order: Vec<String>,
}

/// Validate `nodes` against §4.F's rules and compute a topological order.
///
/// `known_engines` is the set of `engine_ref` values the caller can
/// actually resolve (registered `Engine` constructors); an unresolvable
/// reference is a `ConfigurationError`.
pub fn build_graph(nodes: &[NodeSpec], known_engines: &HashSet<String>) -> Result<PipelineGraph, EngineError> {
    validate_unique_ids(nodes)?;
    let producer_of = validate_single_producer(nodes)?;
    validate_engine_refs(nodes, known_engines)?;
    let order = topological_order(nodes, &producer_of)?;
    Ok(PipelineGraph { order })
}

fn validate_unique_ids(nodes: &[NodeSpec]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(EngineError::InvalidPipeline {
                message: format!("duplicate node id '{}'", node.id),
            });
        }
    }
    Ok(())
}

/// Map each non-sentinel bus name to the single node id that produces it,
/// failing if a name is produced by more than one node or by none at all
/// when consumed.
fn validate_single_producer(nodes: &[NodeSpec]) -> Result<HashMap<String, String>, EngineError> {
    let mut producer_of: HashMap<String, String> = HashMap::new();
    for node in nodes {
        for output in &node.outputs {
            if is_sentinel(output) {
                return Err(EngineError::InvalidPipeline {
                    message: format!("node '{}' cannot produce sentinel '{output}'", node.id),
                });
            }
            if let Some(existing) = producer_of.insert(output.clone(), node.id.clone()) {
                return Err(EngineError::InvalidPipeline {
                    message: format!(
                        "bus name '{output}' is produced by both '{existing}' and '{}'",
                        node.id
                    ),
                });
            }
        }
    }

    for node in nodes {
        for input in &node.inputs {
            if is_sentinel(input) {
                continue;
            }
            if !producer_of.contains_key(input) {
                return Err(EngineError::InvalidPipeline {
                    message: format!("node '{}' consumes '{input}', which no node produces", node.id),
                });
            }
        }
    }

    Ok(producer_of)
}

fn validate_engine_refs(nodes: &[NodeSpec], known_engines: &HashSet<String>) -> Result<(), EngineError> {
    for node in nodes {
        if !known_engines.contains(&node.engine) {
            return Err(EngineError::InvalidPipeline {
                message: format!("node '{}' references unknown engine '{}'", node.id, node.engine),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm, breaking ties by declaration order so that two nodes
/// with no dependency relationship between them always come out in the
/// same relative order (§4.F "stable by declaration order on ties").
fn topological_order(
    nodes: &[NodeSpec],
    producer_of: &HashMap<String, String>,
) -> Result<Vec<String>, EngineError> {
    let index_of: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id.as_str(), i)).collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in nodes {
        in_degree.entry(node.id.as_str()).or_insert(0);
        for input in &node.inputs {
            if is_sentinel(input) {
                continue;
            }
            let producer = producer_of.get(input).expect("validated above").as_str();
            *in_degree.entry(node.id.as_str()).or_insert(0) += 1;
            dependents.entry(producer).or_default().push(node.id.as_str());
        }
    }

    let mut ready: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    // Stable by declaration order: sort the initial ready set by index
    // rather than relying on HashMap iteration order.
    let mut ready_vec: Vec<&str> = ready.drain(..).collect();
    ready_vec.sort_by_key(|id| index_of[id]);
    let mut ready: VecDeque<&str> = ready_vec.into();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        if let Some(children) = dependents.get(id) {
            let mut newly_ready = Vec::new();
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(*child);
                }
            }
            newly_ready.sort_by_key(|id| index_of[id]);
            for child in newly_ready {
                // Insert keeping the queue sorted by declaration index so
                // ties always resolve the same way regardless of which
                // node unblocked them first.
                let pos = ready.iter().position(|r| index_of[r] > index_of[child]).unwrap_or(ready.len());
                ready.insert(pos, child);
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(EngineError::InvalidPipeline {
            message: "pipeline graph contains a cycle".to_string(),
        });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, engine: &str, inputs: &[&str], outputs: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            engine: engine.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            config: Default::default(),
            timeout_ms: None,
        }
    }

    fn engines(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_linear_chain_topological_order() {
        let nodes = vec![
            node("esg", "scenario_gen", &["$scenarios"], &["bus://scenarios/rates"]),
            node("proj", "kernel", &["bus://scenarios/rates", "$policies"], &["bus://results/npv"]),
        ];
        let graph = build_graph(&nodes, &engines(&["scenario_gen", "kernel"])).unwrap();
        assert_eq!(graph.order, vec!["esg", "proj"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let nodes = vec![node("a", "e", &[], &[]), node("a", "e", &[], &[])];
        assert!(build_graph(&nodes, &engines(&["e"])).is_err());
    }

    #[test]
    fn test_unresolvable_engine_rejected() {
        let nodes = vec![node("a", "missing", &[], &[])];
        assert!(build_graph(&nodes, &engines(&["e"])).is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let nodes = vec![
            node("a", "e", &["bus://x/b"], &["bus://x/a"]),
            node("b", "e", &["bus://x/a"], &["bus://x/b"]),
        ];
        assert!(build_graph(&nodes, &engines(&["e"])).is_err());
    }

    #[test]
    fn test_unproduced_input_rejected() {
        let nodes = vec![node("a", "e", &["bus://x/ghost"], &[])];
        assert!(build_graph(&nodes, &engines(&["e"])).is_err());
    }

    #[test]
    fn test_independent_nodes_kept_in_declaration_order() {
        let nodes = vec![
            node("first", "e", &["$policies"], &["bus://x/a"]),
            node("second", "e", &["$policies"], &["bus://x/b"]),
        ];
        let graph = build_graph(&nodes, &engines(&["e"])).unwrap();
        assert_eq!(graph.order, vec!["first", "second"]);
    }
}
