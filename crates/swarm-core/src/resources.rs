//! Resource vectors: quantities across the four accounted dimensions.
//!
//! CPU is tracked in integer millicores so that repeated allocate/release
//! cycles never accumulate rounding error.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// One accounted resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDimension {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl ResourceDimension {
    /// All dimensions, in reporting order.
    pub const ALL: [ResourceDimension; 4] = [
        ResourceDimension::Cpu,
        ResourceDimension::Memory,
        ResourceDimension::Disk,
        ResourceDimension::Network,
    ];

    /// Unit label used in logs and metric names.
    pub fn unit(&self) -> &'static str {
        match self {
            ResourceDimension::Cpu => "millicores",
            ResourceDimension::Memory => "mb",
            ResourceDimension::Disk => "mb",
            ResourceDimension::Network => "mbps",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceDimension::Cpu => "cpu",
            ResourceDimension::Memory => "memory",
            ResourceDimension::Disk => "disk",
            ResourceDimension::Network => "network",
        }
    }
}

impl fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity of every resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceVector {
    /// CPU in millicores (1000 = one core).
    pub cpu_millis: u64,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Disk in megabytes.
    pub disk_mb: u64,
    /// Network bandwidth in megabits per second.
    pub network_mbps: u64,
}

impl ResourceVector {
    pub const ZERO: ResourceVector = ResourceVector {
        cpu_millis: 0,
        memory_mb: 0,
        disk_mb: 0,
        network_mbps: 0,
    };

    pub fn new(cpu_millis: u64, memory_mb: u64, disk_mb: u64, network_mbps: u64) -> Self {
        Self {
            cpu_millis,
            memory_mb,
            disk_mb,
            network_mbps,
        }
    }

    /// Convenience constructor for a CPU-only request in whole cores.
    pub fn cores(cores: u64) -> Self {
        Self {
            cpu_millis: cores * 1000,
            ..Self::ZERO
        }
    }

    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_disk_mb(mut self, disk_mb: u64) -> Self {
        self.disk_mb = disk_mb;
        self
    }

    pub fn with_network_mbps(mut self, network_mbps: u64) -> Self {
        self.network_mbps = network_mbps;
        self
    }

    /// Quantity for a single dimension.
    pub fn get(&self, dim: ResourceDimension) -> u64 {
        match dim {
            ResourceDimension::Cpu => self.cpu_millis,
            ResourceDimension::Memory => self.memory_mb,
            ResourceDimension::Disk => self.disk_mb,
            ResourceDimension::Network => self.network_mbps,
        }
    }

    pub fn is_zero(&self) -> bool {
        ResourceDimension::ALL.iter().all(|d| self.get(*d) == 0)
    }

    /// Dimensions where `self` exceeds `available`.
    pub fn exceeding(&self, available: &ResourceVector) -> Vec<ResourceDimension> {
        ResourceDimension::ALL
            .into_iter()
            .filter(|d| self.get(*d) > available.get(*d))
            .collect()
    }

    /// True when every dimension of `self` fits within `available`.
    pub fn fits_within(&self, available: &ResourceVector) -> bool {
        self.exceeding(available).is_empty()
    }

    pub fn saturating_sub(&self, other: &ResourceVector) -> ResourceVector {
        ResourceVector {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            disk_mb: self.disk_mb.saturating_sub(other.disk_mb),
            network_mbps: self.network_mbps.saturating_sub(other.network_mbps),
        }
    }

    /// Mean fraction of `capacity` this vector represents, over dimensions
    /// with non-zero capacity. Returns 0.0 when no dimension has capacity.
    pub fn share_of(&self, capacity: &ResourceVector) -> f64 {
        let mut total = 0.0;
        let mut counted = 0u32;
        for dim in ResourceDimension::ALL {
            let cap = capacity.get(dim);
            if cap > 0 {
                total += self.get(dim) as f64 / cap as f64;
                counted += 1;
            }
        }
        if counted == 0 {
            0.0
        } else {
            total / counted as f64
        }
    }
}

impl Add for ResourceVector {
    type Output = ResourceVector;

    fn add(self, rhs: ResourceVector) -> ResourceVector {
        ResourceVector {
            cpu_millis: self.cpu_millis + rhs.cpu_millis,
            memory_mb: self.memory_mb + rhs.memory_mb,
            disk_mb: self.disk_mb + rhs.disk_mb,
            network_mbps: self.network_mbps + rhs.network_mbps,
        }
    }
}

impl Sub for ResourceVector {
    type Output = ResourceVector;

    /// Saturating per-dimension subtraction.
    fn sub(self, rhs: ResourceVector) -> ResourceVector {
        self.saturating_sub(&rhs)
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={}m mem={}MB disk={}MB net={}Mbps",
            self.cpu_millis, self.memory_mb, self.disk_mb, self.network_mbps
        )
    }
}
