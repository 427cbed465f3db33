//! Ledger error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use swarm_core::ResourceDimension;

/// A dimension that could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstrainedDimension {
    pub dimension: ResourceDimension,
    pub requested: u64,
    pub free: u64,
}

impl std::fmt::Display for ConstrainedDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (requested {} {}, free {})",
            self.dimension,
            self.requested,
            self.dimension.unit(),
            self.free
        )
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("insufficient capacity: {}", format_constrained(.0))]
    InsufficientCapacity(Vec<ConstrainedDimension>),
}

impl LedgerError {
    /// The dimensions that blocked the request.
    pub fn constrained(&self) -> &[ConstrainedDimension] {
        match self {
            LedgerError::InsufficientCapacity(dims) => dims,
        }
    }
}

fn format_constrained(dims: &[ConstrainedDimension]) -> String {
    dims.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type LedgerResult<T> = Result<T, LedgerError>;
