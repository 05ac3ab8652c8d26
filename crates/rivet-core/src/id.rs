//! Strongly-typed identifiers.

use std::fmt;

/// Identifies a solver within a registry.
///
/// Allocated sequentially by the registry when a solver is created and
/// never reused for the registry's lifetime, so a stale id held after
/// destruction can only miss, never alias a newer solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolverId(pub u64);

impl fmt::Display for SolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SolverId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
