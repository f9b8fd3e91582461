//!
//! # Volume Claim Status
//!

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeResolution {
    /// claimed, no deployment uses it yet
    #[default]
    Pending,
    /// bound to a deployment
    Bound,
}

impl fmt::Display for VolumeResolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Bound => write!(f, "Bound"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeStatus {
    pub resolution: VolumeResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_to: Option<ObjectKey>,
}

impl VolumeStatus {
    pub fn bound(deployment: ObjectKey) -> Self {
        Self {
            resolution: VolumeResolution::Bound,
            bound_to: Some(deployment),
        }
    }
}
