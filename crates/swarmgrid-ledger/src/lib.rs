//! swarmgrid-ledger — capacity accounting for SwarmGrid.
//!
//! The ledger is the only component allowed to change capacity counters.
//! Agents reserve a baseline footprint on registration and tasks reserve
//! their estimate on assignment; both hold an `AllocationId` handle and
//! never a copy of the amounts.
//!
//! # Architecture
//!
//! ```text
//! ResourceLedger
//!   ├── allocate(holder, request) → AllocationId | InsufficientCapacity
//!   ├── release(id)               → Released | AlreadyReleased | Unknown
//!   ├── current_usage()           → UsageSnapshot (used/total/free)
//!   └── optimize()                → Vec<Reallocation> (advisory)
//! ```

pub mod error;
pub mod ledger;
pub mod optimize;

pub use error::{ConstrainedDimension, LedgerError, LedgerResult};
pub use ledger::{
    Allocation, AllocationId, DimensionUsage, Holder, LedgerStats, Release, ResourceLedger,
    UsageSnapshot,
};
pub use optimize::{Reallocation, DEFAULT_REBALANCE_TOLERANCE};
