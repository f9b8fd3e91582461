//!
//! # Instance Spec
//!
//! One running unit backing a Deployment. The spec is immutable for the
//! life of the instance: configuration changes roll out by replacing
//! instances, never by mutating them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deployment::StorageBacking;
use crate::key::ObjectKey;
use crate::template::ResolvedTemplate;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSpec {
    /// key of the owning Deployment
    pub owner_key: ObjectKey,
    /// fingerprint of the resolved template, compared during rollouts
    pub fingerprint: String,
    /// env-resolved snapshot this instance runs with
    pub template: ResolvedTemplate,
    pub storage: StorageBacking,
    /// minted at creation, drives oldest-first victim ordering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl InstanceSpec {
    pub fn new(owner_key: ObjectKey, template: ResolvedTemplate, storage: StorageBacking) -> Self {
        Self {
            owner_key,
            fingerprint: template.fingerprint(),
            template,
            storage,
            created_at: Some(Utc::now()),
        }
    }
}
