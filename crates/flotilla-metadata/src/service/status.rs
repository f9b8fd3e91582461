//!
//! # Service Status
//!

use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStatus {
    pub endpoints: Vec<Endpoint>,
}

impl ServiceStatus {
    pub fn ready_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.ready).count()
    }
}

/// one instance behind a service; only ready endpoints receive traffic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub instance: ObjectKey,
    pub ready: bool,
}
