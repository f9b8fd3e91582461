//!
//! # Service Spec
//!
//! A stable name over the ready instances of selector-matched Deployments.
//! There is no data plane here; the service reconciler maintains the
//! endpoint list in status for embedding layers to consume.

use serde::{Deserialize, Serialize};

use crate::labels::Labels;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    pub selector: Labels,
    pub port: u16,
}

impl ServiceSpec {
    pub fn new(selector: impl Into<Labels>, port: u16) -> Self {
        Self {
            selector: selector.into(),
            port,
        }
    }

    /// validate configuration, return string with errors
    pub fn validate_config(&self) -> Option<String> {
        if self.selector.is_empty() {
            return Some("selector must not be empty".to_owned());
        }
        if self.port == 0 {
            return Some("port must not be 0".to_owned());
        }
        None
    }
}
