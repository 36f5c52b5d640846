//! Maps an `engine_ref` string to a constructor for a fresh `Engine`
//! instance, per SPEC_FULL.md §4.F ("engine_ref resolvable").

use super::engine_trait::Engine;
use std::collections::{HashMap, HashSet};

type Factory = Box<dyn Fn() -> Box<dyn Engine> + Send + Sync>;

#[derive(Default)]
pub struct EngineRegistry {
    factories: HashMap<String, Factory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> Box<dyn Engine> + Send + Sync + 'static) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn known_names(&self) -> HashSet<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn construct(&self, name: &str) -> Option<Box<dyn Engine>> {
        self.factories.get(name).map(|f| f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::pipeline::engine_trait::{ChunkOutcome, Credentials, EngineConfig, EngineInfo};

    struct Stub;
    impl Engine for Stub {
        fn info(&self) -> EngineInfo {
            EngineInfo {
                name: "stub".to_string(),
                version: "0.1".to_string(),
                engine_type: "test".to_string(),
                supports_am: false,
                max_buffer_size: 0,
            }
        }
        fn initialize(&mut self, _c: &EngineConfig, _cred: Option<&Credentials>) -> Result<(), crate::error::EngineError> {
            Ok(())
        }
        fn run_chunk(&mut self, _bus: &Bus, _inputs: &[String], _outputs: &[String]) -> ChunkOutcome {
            ChunkOutcome::ok(0, 0, 0)
        }
        fn dispose(&mut self) {}
    }

    #[test]
    fn test_register_and_construct() {
        let mut registry = EngineRegistry::new();
        registry.register("stub", || Box::new(Stub));
        assert!(registry.known_names().contains("stub"));
        assert!(registry.construct("stub").is_some());
        assert!(registry.construct("missing").is_none());
    }
}
