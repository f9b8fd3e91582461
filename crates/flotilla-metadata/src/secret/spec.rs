//!
//! # Secret Spec
//!
//! Like a ConfigMap but with values kept out of logs: the Debug rendering
//! never shows secret data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretSpec {
    pub data: BTreeMap<String, String>,
}

impl SecretSpec {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|v| v.as_str())
    }
}

impl fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let keys: Vec<&str> = self.data.keys().map(|k| k.as_str()).collect();
        f.debug_struct("SecretSpec").field("keys", &keys).finish()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for SecretSpec
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

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStatus {}
