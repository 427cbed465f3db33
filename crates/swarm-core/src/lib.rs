//! swarm-core — shared types and configuration for SwarmGrid.
//!
//! Holds the vocabulary every other crate speaks: agent and task
//! identifiers, lifecycle statuses, resource vectors, the strategy enum,
//! and the validated `swarm.toml` configuration surface.

pub mod config;
pub mod resources;
pub mod types;

pub use config::{
    AgentTemplate, BalancingConfig, ConfigError, HealthConfig, HumanDuration, MetricsConfig,
    PoolConfig, ScalingConfig, SwarmConfig, TaskConfig,
};
pub use resources::{ResourceDimension, ResourceVector};
pub use types::*;
