//! swarm.toml configuration parser and validation.
//!
//! Every section has defaults so a minimal file only needs the values
//! that differ. Validation never clamps: an out-of-range value is an
//! error and the coordinator refuses to start.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::ResourceVector;
use crate::types::{AgentSpec, LoadBalancingStrategy, Priority, WeightSource};

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid duration {value:?}: expected forms like \"500ms\", \"30s\", \"5m\"")]
    Duration { value: String },

    #[error("min_agents ({min}) exceeds max_agents ({max})")]
    MinExceedsMax { min: u32, max: u32 },

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("scale_down_threshold ({down}) must be below scale_up_threshold ({up})")]
    ThresholdOrder { down: f64, up: f64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("priority_reserved_slots ({reserved}) must be below per_agent_concurrency ({limit})")]
    ReservedSlots { reserved: u32, limit: u32 },

    #[error("scaling agent template requires {required} which exceeds total capacity {capacity}")]
    TemplateExceedsCapacity {
        required: ResourceVector,
        capacity: ResourceVector,
    },
}

// ── Durations ─────────────────────────────────────────────────────

/// A duration written as a human string ("500ms", "30s", "5m", "1h").
///
/// A bare integer is read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<HumanDuration> for Duration {
    fn from(d: HumanDuration) -> Self {
        d.0
    }
}

impl FromStr for HumanDuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
            .map(HumanDuration)
            .ok_or_else(|| ConfigError::Duration {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HumanDuration> for String {
    fn from(d: HumanDuration) -> Self {
        d.to_string()
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms % 1000 != 0 {
            write!(f, "{ms}ms")
        } else if ms % 60_000 == 0 && ms > 0 {
            write!(f, "{}m", ms / 60_000)
        } else {
            write!(f, "{}s", ms / 1000)
        }
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

// ── Sections ──────────────────────────────────────────────────────

/// Top-level swarm.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwarmConfig {
    pub pool: PoolConfig,
    /// Total system capacity shared by agents and tasks.
    pub capacity: ResourceVector,
    pub health: HealthConfig,
    pub tasks: TaskConfig,
    pub balancing: BalancingConfig,
    pub scaling: ScalingConfig,
    pub metrics: MetricsConfig,
}

/// Agent pool bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_agents: u32,
    pub max_agents: u32,
    /// Maximum tasks in flight on one agent.
    pub per_agent_concurrency: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_agents: 1,
            max_agents: 10,
            per_agent_concurrency: 4,
        }
    }
}

/// Heartbeat and failure detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Agents silent for longer than this are failed.
    pub heartbeat_timeout: HumanDuration,
    /// Consecutive unhealthy heartbeats before an agent is failed.
    pub failure_threshold: u32,
    /// How often the monitoring sweep runs.
    pub sweep_interval: HumanDuration,
    /// Failed agents kept for queries after leaving the live set.
    pub retired_history: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: HumanDuration::from_secs(30),
            failure_threshold: 3,
            sweep_interval: HumanDuration::from_secs(5),
            retired_history: 64,
        }
    }
}

/// Task retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Failures after which a task is permanently failed.
    pub retry_limit: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { retry_limit: 3 }
    }
}

/// Load balancing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancingConfig {
    pub strategy: LoadBalancingStrategy,
    /// Tasks at or above this priority may use reserved slots
    /// (priority-weighted strategy only).
    pub priority_overflow_threshold: Priority,
    /// Slots per agent held back for high-priority tasks
    /// (priority-weighted strategy only).
    pub priority_reserved_slots: u32,
    pub weight_source: WeightSource,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::LeastLoaded,
            priority_overflow_threshold: 100,
            priority_reserved_slots: 0,
            weight_source: WeightSource::Static,
        }
    }
}

/// Autoscaling thresholds and timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    /// Minimum time between two actions in the same direction.
    pub cooldown: HumanDuration,
    /// High utilization must persist this long before scaling up.
    pub scale_up_sustain: HumanDuration,
    /// Low utilization must persist this long before scaling down.
    pub scale_down_sustain: HumanDuration,
    /// How long a scale-down waits for an idle agent before draining one.
    pub scale_down_max_wait: HumanDuration,
    /// Maximum agents added or removed per action.
    pub step: u32,
    pub evaluation_interval: HumanDuration,
    /// Decision records kept.
    pub history_limit: usize,
    /// Blueprint for agents launched by scale-up.
    pub agent_template: AgentTemplate,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            cooldown: HumanDuration::from_secs(60),
            scale_up_sustain: HumanDuration::from_secs(0),
            scale_down_sustain: HumanDuration::from_secs(120),
            scale_down_max_wait: HumanDuration::from_secs(300),
            step: 1,
            evaluation_interval: HumanDuration::from_secs(15),
            history_limit: 100,
            agent_template: AgentTemplate::default(),
        }
    }
}

/// Blueprint for autoscaled agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentTemplate {
    /// Generated ids are `{id_prefix}-{n}`.
    pub id_prefix: String,
    pub capabilities: BTreeSet<String>,
    pub weight: u32,
    pub requirements: ResourceVector,
}

impl Default for AgentTemplate {
    fn default() -> Self {
        Self {
            id_prefix: "auto".to_string(),
            capabilities: BTreeSet::new(),
            weight: 1,
            requirements: ResourceVector::ZERO,
        }
    }
}

impl AgentTemplate {
    /// Registration request for the agent with the given id.
    pub fn to_spec(&self, id: String) -> AgentSpec {
        AgentSpec {
            id: Some(id),
            capabilities: self.capabilities.clone(),
            requirements: self.requirements,
            weight: self.weight,
        }
    }
}

/// Monitoring export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How often snapshots are pushed to subscribers.
    pub publish_interval: HumanDuration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            publish_interval: HumanDuration::from_secs(10),
        }
    }
}

impl SwarmConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SwarmConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every startup rule, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.pool;
        if pool.max_agents == 0 {
            return Err(ConfigError::Zero("max_agents"));
        }
        if pool.min_agents > pool.max_agents {
            return Err(ConfigError::MinExceedsMax {
                min: pool.min_agents,
                max: pool.max_agents,
            });
        }
        if pool.per_agent_concurrency == 0 {
            return Err(ConfigError::Zero("per_agent_concurrency"));
        }

        let scaling = &self.scaling;
        for (name, value) in [
            ("scale_up_threshold", scaling.scale_up_threshold),
            ("scale_down_threshold", scaling.scale_down_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if scaling.scale_down_threshold >= scaling.scale_up_threshold {
            return Err(ConfigError::ThresholdOrder {
                down: scaling.scale_down_threshold,
                up: scaling.scale_up_threshold,
            });
        }
        if scaling.step == 0 {
            return Err(ConfigError::Zero("step"));
        }
        if scaling.history_limit == 0 {
            return Err(ConfigError::Zero("history_limit"));
        }
        if scaling.evaluation_interval.as_duration().is_zero() {
            return Err(ConfigError::Zero("evaluation_interval"));
        }
        if !scaling.agent_template.requirements.fits_within(&self.capacity) {
            return Err(ConfigError::TemplateExceedsCapacity {
                required: scaling.agent_template.requirements,
                capacity: self.capacity,
            });
        }

        let health = &self.health;
        if health.heartbeat_timeout.as_duration().is_zero() {
            return Err(ConfigError::Zero("heartbeat_timeout"));
        }
        if health.failure_threshold == 0 {
            return Err(ConfigError::Zero("failure_threshold"));
        }
        if health.sweep_interval.as_duration().is_zero() {
            return Err(ConfigError::Zero("sweep_interval"));
        }

        if self.balancing.priority_reserved_slots >= pool.per_agent_concurrency {
            return Err(ConfigError::ReservedSlots {
                reserved: self.balancing.priority_reserved_slots,
                limit: pool.per_agent_concurrency,
            });
        }

        if self.metrics.publish_interval.as_duration().is_zero() {
            return Err(ConfigError::Zero("publish_interval"));
        }

        Ok(())
    }

    /// Scaffold a starter swarm.toml with explicit capacity.
    pub fn scaffold(capacity: ResourceVector) -> Self {
        let mut config = SwarmConfig {
            capacity,
            ..SwarmConfig::default()
        };
        config.scaling.agent_template.capabilities.insert("default".to_string());
        config
    }
}
