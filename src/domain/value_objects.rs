//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a health check. Exactly one of two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    /// Parse a stored status. Anything other than the two known values is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result label for a tracked database query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Success,
    Error,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Connection state label used by the pool occupancy gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Total,
    Active,
    Idle,
    Waiting,
}

impl PoolState {
    pub const ALL: [PoolState; 4] = [Self::Total, Self::Active, Self::Idle, Self::Waiting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Waiting => "waiting",
        }
    }
}
