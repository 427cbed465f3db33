//! swarmgrid-autoscale — utilization-driven agent pool scaling.
//!
//! Reads a `CoordinatorSnapshot`, asks a `ScalingPolicy` which way the pool
//! should move, and launches or retires agents through the coordinator.
//! Every action is appended to a bounded `ScalingHistory`.
//!
//! # Scaling Algorithm
//!
//! ```text
//! u = bottleneck utilization (max over resource dimensions)
//!
//! if pool < min_agents:
//!     launch min_agents - pool agents from the template
//!
//! if u > scale_up_threshold for scale_up_sustain
//!    and pool < max_agents and scale-up cooldown expired:
//!     launch min(step, max_agents - pool) agents from the template
//!
//! if u < scale_down_threshold for scale_down_sustain
//!    and active pool > min_agents and scale-down cooldown expired:
//!     terminate idle agents (newest first)
//!     if none idle for scale_down_max_wait:
//!         drain least-loaded agent, terminate once its work is done
//! ```
//!
//! Cooldowns are kept per direction, so a scale-up does not block a later
//! scale-down and vice versa.

pub mod history;
pub mod policy;
pub mod scaler;

pub use history::{ScalingDecisionRecord, ScalingDirection, ScalingHistory};
pub use policy::{Recommendation, ScalingPolicy, ScalingSignals, ThresholdPolicy};
pub use scaler::{ScalingController, ScalingPhase};
