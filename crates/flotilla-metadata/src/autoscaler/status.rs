//!
//! # Autoscaler Status
//!
//! The last-scale timestamps here back the stabilization windows: the
//! evaluator compares against them instead of keeping timer state, so a
//! restart cannot forget an in-flight window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flotilla_types::ReplicaCount;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoscalerStatus {
    pub current_replicas: ReplicaCount,
    pub desired_replicas: ReplicaCount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scale_up: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scale_down: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated: Option<DateTime<Utc>>,
}

impl AutoscalerStatus {
    /// seconds since the last scale in the given direction, if any
    pub fn since_last(&self, up: bool, now: DateTime<Utc>) -> Option<i64> {
        let last = if up { self.last_scale_up } else { self.last_scale_down };
        last.map(|t| now.signed_duration_since(t).num_seconds())
    }
}
