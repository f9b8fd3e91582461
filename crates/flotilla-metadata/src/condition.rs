//!
//! # Status Conditions
//!
//! Ordered condition sequences carried by Deployment status. The transition
//! timestamp moves only when the condition status actually flips, so a
//! reconciler refreshing an unchanged condition does not churn the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Available,
    Progressing,
    Degraded,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::Progressing => write!(f, "Progressing"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(condition_type: ConditionType, status: impl Into<ConditionStatus>) -> Self {
        Self {
            condition_type,
            status: status.into(),
            last_transition_time: Utc::now(),
            reason: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Upsert by condition type, preserving first-appearance order. The
/// transition time of an existing condition is kept unless the status
/// flipped.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut next: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == next.condition_type)
    {
        if existing.status == next.status {
            next.last_transition_time = existing.last_transition_time;
        }
        *existing = next;
    } else {
        conditions.push(next);
    }
}

pub fn find_condition(
    conditions: &[Condition],
    condition_type: ConditionType,
) -> Option<&Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
