//!
//! # Deployment Spec
//!
//! Desired state for a replicated workload: how many instances, from which
//! template, how updates roll out and what storage backs each instance.

use serde::{Deserialize, Serialize};

use flotilla_types::ReplicaCount;
use flotilla_types::defaults::{
    ROLLOUT_MAX_SURGE, ROLLOUT_MAX_UNAVAILABLE, ROLLOUT_PROGRESS_DEADLINE_SEC,
};

use crate::labels::Labels;
use crate::template::InstanceTemplate;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentSpec {
    pub replicas: ReplicaCount,
    pub template: InstanceTemplate,
    pub labels: Labels,
    pub strategy: RolloutStrategy,
    pub storage: StorageBacking,
    pub min_ready_secs: u32,
}

impl DeploymentSpec {
    pub fn new(replicas: ReplicaCount, template: InstanceTemplate) -> Self {
        Self {
            replicas,
            template,
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: impl Into<Labels>) -> Self {
        self.labels = labels.into();
        self
    }

    pub fn with_storage(mut self, storage: StorageBacking) -> Self {
        self.storage = storage;
        self
    }

    /// volume claim name when persistent storage is requested
    pub fn claim(&self) -> Option<&str> {
        match &self.storage {
            StorageBacking::Ephemeral => None,
            StorageBacking::PersistentClaim { claim } => Some(claim),
        }
    }

    /// validate configuration, return string with errors
    pub fn validate_config(&self) -> Option<String> {
        if let Some(error) = self.template.validate_config() {
            return Some(error);
        }

        if let Some(error) = self.strategy.validate_config() {
            return Some(error);
        }

        if let Some(claim) = self.claim() {
            if claim.is_empty() {
                return Some("persistent claim name must not be empty".to_owned());
            }
        }

        None
    }
}

/// bounds on how far a rolling update may run ahead of or behind the
/// desired replica count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolloutStrategy {
    pub max_surge: ReplicaCount,
    pub max_unavailable: ReplicaCount,
    pub progress_deadline_secs: u32,
}

impl Default for RolloutStrategy {
    fn default() -> Self {
        Self {
            max_surge: ROLLOUT_MAX_SURGE,
            max_unavailable: ROLLOUT_MAX_UNAVAILABLE,
            progress_deadline_secs: ROLLOUT_PROGRESS_DEADLINE_SEC,
        }
    }
}

impl RolloutStrategy {
    fn validate_config(&self) -> Option<String> {
        if self.max_surge == 0 && self.max_unavailable == 0 {
            return Some("max_surge and max_unavailable cannot both be 0".to_owned());
        }
        if self.progress_deadline_secs == 0 {
            return Some("progress_deadline_secs must be at least 1".to_owned());
        }
        None
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageBacking {
    #[default]
    Ephemeral,
    PersistentClaim {
        claim: String,
    },
}

#[cfg(test)]
mod test {

    use crate::template::InstanceTemplate;

    use super::*;

    #[test]
    fn test_spec_validation() {
        let good = DeploymentSpec::new(3, InstanceTemplate::with_image("flask-app:v1"));
        assert!(good.validate_config().is_none());

        // empty image is caught through the template
        let empty = DeploymentSpec::default();
        assert!(empty.validate_config().is_some());

        let mut frozen = good.clone();
        frozen.strategy.max_surge = 0;
        frozen.strategy.max_unavailable = 0;
        assert!(frozen.validate_config().expect("error").contains("max_surge"));

        let unnamed_claim = good.clone().with_storage(StorageBacking::PersistentClaim {
            claim: String::new(),
        });
        assert!(unnamed_claim.validate_config().is_some());
    }

    #[test]
    fn test_spec_yaml_shape() {
        let spec = DeploymentSpec::new(3, InstanceTemplate::with_image("flask-app:v1"))
            .with_labels([("app", "web")])
            .with_storage(StorageBacking::PersistentClaim {
                claim: "web-data".to_owned(),
            });

        let yaml = serde_yaml::to_string(&spec).expect("serialize");
        assert!(yaml.contains("replicas: 3"));
        assert!(yaml.contains("image: flask-app:v1"));
        assert!(yaml.contains("persistentClaim"));

        let back: DeploymentSpec = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, spec);
    }

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let spec: DeploymentSpec = serde_yaml::from_str(
            r#"
replicas: 2
template:
  image: flask-app:v1
"#,
        )
        .expect("deserialize");

        assert_eq!(spec.replicas, 2);
        assert_eq!(spec.strategy, RolloutStrategy::default());
        assert_eq!(spec.storage, StorageBacking::Ephemeral);
        assert_eq!(spec.min_ready_secs, 0);
    }
}
