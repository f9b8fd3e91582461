//!
//! # Deployment Status
//!

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flotilla_types::{Generation, ReplicaCount};

use crate::condition::{Condition, ConditionType, find_condition, upsert_condition};
use crate::template::InstanceTemplate;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatus {
    /// spec generation this status was computed from
    pub observed_generation: Generation,
    /// instances that exist and are not terminating
    pub replicas: ReplicaCount,
    pub ready_replicas: ReplicaCount,
    pub available_replicas: ReplicaCount,
    pub conditions: Vec<Condition>,
    pub rollout: RolloutStatus,
}

impl DeploymentStatus {
    pub fn set_condition(&mut self, condition: Condition) {
        upsert_condition(&mut self.conditions, condition);
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        find_condition(&self.conditions, condition_type)
    }

    pub fn is_available(&self) -> bool {
        self.condition(ConditionType::Available)
            .map(|c| c.status.is_true())
            .unwrap_or(false)
    }

    pub fn is_degraded(&self) -> bool {
        self.condition(ConditionType::Degraded)
            .map(|c| c.status.is_true())
            .unwrap_or(false)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "gen:{} ready:{}/{} {}",
            self.observed_generation, self.ready_replicas, self.replicas, self.rollout.state
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutState {
    #[default]
    Stable,
    RollingOut,
    RollingBack,
}

impl RolloutState {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "Stable"),
            Self::RollingOut => write!(f, "RollingOut"),
            Self::RollingBack => write!(f, "RollingBack"),
        }
    }
}

/// Rollout bookkeeping. The stable template is recorded each time a rollout
/// settles, so a later stalled rollout can be reverted to the last
/// configuration that was fully ready.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolloutStatus {
    pub state: RolloutState,
    pub target_fingerprint: String,
    pub stable_fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_template: Option<InstanceTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RolloutStatus {
    /// rollout finished, the target fingerprint and template are the
    /// known-good ones now
    pub fn settle(&mut self, fingerprint: String, template: InstanceTemplate) {
        self.state = RolloutState::Stable;
        self.stable_fingerprint = fingerprint.clone();
        self.target_fingerprint = fingerprint;
        self.stable_template = Some(template);
        self.started_at = None;
        self.reason = None;
    }
}
