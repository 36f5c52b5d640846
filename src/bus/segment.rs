//! Bus segment naming and handles, per §4.E.

use crate::error::EngineError;

/// A validated `bus://<category>/<label>` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusName(String);

impl BusName {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let rest = raw.strip_prefix("bus://").ok_or_else(|| EngineError::Configuration {
            message: format!("bus name '{raw}' must start with 'bus://'"),
            path: None,
        })?;
        let mut parts = rest.splitn(2, '/');
        let category = parts.next().unwrap_or("");
        let label = parts.next().unwrap_or("");
        if category.is_empty() || label.is_empty() || label.contains('/') {
            return Err(EngineError::Configuration {
                message: format!("bus name '{raw}' must match 'bus://<category>/<label>'"),
                path: None,
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BusName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque reference to an allocated segment, returned by `Bus::allocate`.
/// Carries enough identity to look the segment back up in the registry but
/// owns none of its storage -- the bus is the sole arena owner (§9).
#[derive(Debug, Clone)]
pub struct SegmentHandle {
    pub name: BusName,
    pub version: u32,
    pub shape: Vec<usize>,
}
