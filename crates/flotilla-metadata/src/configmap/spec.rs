//!
//! # ConfigMap Spec
//!
//! Named key/value configuration. Instances resolve references at creation
//! time; editing a ConfigMap never reaches already-running instances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigMapSpec {
    pub data: BTreeMap<String, String>,
}

impl ConfigMapSpec {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|v| v.as_str())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ConfigMapSpec
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// config maps carry no observed state
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapStatus {}
