//!
//! # Volume Claim Spec
//!
//! A persistent storage claim a Deployment may name as its backing. The
//! claim must exist when the Deployment is applied; binding happens on
//! first use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeSpec {
    pub capacity_mb: u32,
}

impl VolumeSpec {
    pub fn new(capacity_mb: u32) -> Self {
        Self { capacity_mb }
    }

    /// validate configuration, return string with errors
    pub fn validate_config(&self) -> Option<String> {
        if self.capacity_mb == 0 {
            return Some("capacity_mb must be at least 1".to_owned());
        }
        None
    }
}
