//!
//! # Instance Status
//!

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstancePhase {
    /// created, not yet launched through the runtime
    #[default]
    Pending,
    /// launched, startup/readiness not yet passed
    Running,
    /// running and passing readiness
    Ready,
    /// terminal, waiting for the reconciler to replace it
    Failed,
    /// terminate requested, runtime teardown in flight
    Terminating,
}

impl InstancePhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// launched and still alive
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Running | Self::Ready)
    }
}

impl fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

/// consecutive probe failure counters, written by the health supervisor
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeCounters {
    pub startup_failures: u32,
    pub readiness_failures: u32,
    pub liveness_failures: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceStatus {
    pub phase: InstancePhase,
    pub probes: ProbeCounters,
    /// when the runtime reported the instance running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// when readiness last flipped to passing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InstanceStatus {
    pub fn with_phase(phase: InstancePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// ready, and ready long enough to count as available
    pub fn is_available(&self, min_ready_secs: u32, now: DateTime<Utc>) -> bool {
        if !self.phase.is_ready() {
            return false;
        }
        if min_ready_secs == 0 {
            return true;
        }
        match self.ready_at {
            Some(ready_at) => {
                now.signed_duration_since(ready_at).num_seconds() >= min_ready_secs as i64
            }
            None => false,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.phase)
    }
}
