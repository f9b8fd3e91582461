//!
//! # Instance Template
//!
//! The per-instance configuration a Deployment stamps out: image, env
//! bindings, resource requests and probes. Env references to ConfigMaps and
//! Secrets are resolved once at instance creation; the resolved snapshot is
//! what an instance actually runs with, and its fingerprint is what rollouts
//! compare.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher24;

use flotilla_types::defaults::{
    PROBE_FAILURE_THRESHOLD, PROBE_INITIAL_DELAY_SEC, PROBE_PERIOD_SEC, PROBE_TIMEOUT_SEC,
};

use crate::configmap::ConfigMapSpec;
use crate::secret::SecretSpec;

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceTemplate {
    pub image: String,
    pub env: Vec<EnvVar>,
    pub resources: ResourceRequirements,
    pub probes: ProbeSet,
}

impl InstanceTemplate {
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn add_env(mut self, var: EnvVar) -> Self {
        self.env.push(var);
        self
    }

    /// validate configuration, return string with errors
    pub fn validate_config(&self) -> Option<String> {
        if self.image.is_empty() {
            return Some("image must not be empty".to_owned());
        }

        let mut seen = std::collections::BTreeSet::new();
        for var in &self.env {
            if var.name.is_empty() {
                return Some("env var name must not be empty".to_owned());
            }
            if !seen.insert(&var.name) {
                return Some(format!("duplicate env var '{}'", var.name));
            }
        }

        for (kind, probe) in self.probes.iter() {
            if let Some(error) = probe.validate_config() {
                return Some(format!("{kind} probe: {error}"));
            }
        }

        None
    }

    /// config map and secret names this template reads from
    pub fn references(&self) -> (Vec<&str>, Vec<&str>) {
        let mut config_maps = vec![];
        let mut secrets = vec![];
        for var in &self.env {
            match &var.source {
                EnvSource::Value(_) => {}
                EnvSource::ConfigMapRef { name, .. } => config_maps.push(name.as_str()),
                EnvSource::SecretRef { name, .. } => secrets.push(name.as_str()),
            }
        }
        (config_maps, secrets)
    }

    /// Resolve env references against the given namespace-local objects.
    /// The result is a point-in-time snapshot: later ConfigMap or Secret
    /// edits do not reach instances created from it.
    pub fn resolve(
        &self,
        config_maps: &BTreeMap<String, ConfigMapSpec>,
        secrets: &BTreeMap<String, SecretSpec>,
    ) -> Result<ResolvedTemplate, ReferenceError> {
        let mut env = BTreeMap::new();
        for var in &self.env {
            let value = match &var.source {
                EnvSource::Value(value) => value.clone(),
                EnvSource::ConfigMapRef { name, key } => config_maps
                    .get(name)
                    .ok_or_else(|| ReferenceError::ConfigMapNotFound { name: name.clone() })?
                    .data
                    .get(key)
                    .ok_or_else(|| ReferenceError::ConfigMapKeyMissing {
                        name: name.clone(),
                        key: key.clone(),
                    })?
                    .clone(),
                EnvSource::SecretRef { name, key } => secrets
                    .get(name)
                    .ok_or_else(|| ReferenceError::SecretNotFound { name: name.clone() })?
                    .data
                    .get(key)
                    .ok_or_else(|| ReferenceError::SecretKeyMissing {
                        name: name.clone(),
                        key: key.clone(),
                    })?
                    .clone(),
            };
            env.insert(var.name.clone(), value);
        }

        Ok(ResolvedTemplate {
            image: self.image.clone(),
            env,
            resources: self.resources,
            probes: self.probes.clone(),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(flatten)]
    pub source: EnvSource,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Value(value.into()),
        }
    }

    pub fn from_config_map(
        name: impl Into<String>,
        config_map: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::ConfigMapRef {
                name: config_map.into(),
                key: key.into(),
            },
        }
    }

    pub fn from_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::SecretRef {
                name: secret.into(),
                key: key.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvSource {
    Value(String),
    ConfigMapRef { name: String, key: String },
    SecretRef { name: String, key: String },
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::Value(String::new())
    }
}

/// requested capacity for one instance
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRequirements {
    pub cpu_millis: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeSet {
    pub startup: Option<ProbeSpec>,
    pub readiness: Option<ProbeSpec>,
    pub liveness: Option<ProbeSpec>,
}

impl ProbeSet {
    pub fn get(&self, kind: ProbeKind) -> Option<&ProbeSpec> {
        match kind {
            ProbeKind::Startup => self.startup.as_ref(),
            ProbeKind::Readiness => self.readiness.as_ref(),
            ProbeKind::Liveness => self.liveness.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProbeKind, &ProbeSpec)> {
        [
            (ProbeKind::Startup, self.startup.as_ref()),
            (ProbeKind::Readiness, self.readiness.as_ref()),
            (ProbeKind::Liveness, self.liveness.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, probe)| probe.map(|p| (kind, p)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeKind {
    Startup,
    Readiness,
    Liveness,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Startup => write!(f, "startup"),
            Self::Readiness => write!(f, "readiness"),
            Self::Liveness => write!(f, "liveness"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeSpec {
    pub period_secs: u32,
    pub timeout_secs: u32,
    pub failure_threshold: u32,
    pub initial_delay_secs: u32,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            period_secs: PROBE_PERIOD_SEC,
            timeout_secs: PROBE_TIMEOUT_SEC,
            failure_threshold: PROBE_FAILURE_THRESHOLD,
            initial_delay_secs: PROBE_INITIAL_DELAY_SEC,
        }
    }
}

impl ProbeSpec {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs as u64)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs as u64)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs as u64)
    }

    fn validate_config(&self) -> Option<String> {
        if self.period_secs == 0 {
            return Some("period_secs must be at least 1".to_owned());
        }
        if self.timeout_secs == 0 {
            return Some("timeout_secs must be at least 1".to_owned());
        }
        if self.failure_threshold == 0 {
            return Some("failure_threshold must be at least 1".to_owned());
        }
        None
    }
}

/// Template with every env reference replaced by its value. This is what an
/// instance carries for its entire life.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedTemplate {
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub resources: ResourceRequirements,
    pub probes: ProbeSet,
}

impl ResolvedTemplate {
    /// stable identity of the effective configuration
    pub fn fingerprint(&self) -> String {
        let mut hasher = SipHasher24::new();
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("config map '{name}' not found")]
    ConfigMapNotFound { name: String },
    #[error("config map '{name}' has no key '{key}'")]
    ConfigMapKeyMissing { name: String, key: String },
    #[error("secret '{name}' not found")]
    SecretNotFound { name: String },
    #[error("secret '{name}' has no key '{key}'")]
    SecretKeyMissing { name: String, key: String },
}

#[cfg(test)]
mod test {

    use std::collections::BTreeMap;

    use crate::configmap::ConfigMapSpec;
    use crate::secret::SecretSpec;

    use super::*;

    fn app_config() -> BTreeMap<String, ConfigMapSpec> {
        let mut config_maps = BTreeMap::new();
        config_maps.insert(
            "app-config".to_owned(),
            ConfigMapSpec::from([("LOG_LEVEL", "info")]),
        );
        config_maps
    }

    #[test]
    fn test_resolution_snapshots_values() {
        let template = InstanceTemplate::with_image("flask-app:v1")
            .add_env(EnvVar::literal("PORT", "5000"))
            .add_env(EnvVar::from_config_map("LOG_LEVEL", "app-config", "LOG_LEVEL"));

        let mut config_maps = app_config();
        let resolved = template
            .resolve(&config_maps, &BTreeMap::new())
            .expect("resolve");
        assert_eq!(resolved.env.get("LOG_LEVEL").map(String::as_str), Some("info"));
        assert_eq!(resolved.env.get("PORT").map(String::as_str), Some("5000"));

        // editing the config map after resolution changes nothing
        config_maps.insert(
            "app-config".to_owned(),
            ConfigMapSpec::from([("LOG_LEVEL", "debug")]),
        );
        assert_eq!(resolved.env.get("LOG_LEVEL").map(String::as_str), Some("info"));
    }

    #[test]
    fn test_resolution_fails_on_dangling_reference() {
        let template = InstanceTemplate::with_image("flask-app:v1")
            .add_env(EnvVar::from_secret("DB_PASSWORD", "db-secret", "password"));

        let err = template
            .resolve(&BTreeMap::new(), &BTreeMap::new())
            .expect_err("must fail");
        assert_eq!(
            err,
            ReferenceError::SecretNotFound {
                name: "db-secret".to_owned()
            }
        );

        let template =
            InstanceTemplate::with_image("flask-app:v1").add_env(EnvVar::from_config_map(
                "MISSING",
                "app-config",
                "NO_SUCH_KEY",
            ));
        let err = template
            .resolve(&app_config(), &BTreeMap::new())
            .expect_err("must fail");
        assert_eq!(
            err,
            ReferenceError::ConfigMapKeyMissing {
                name: "app-config".to_owned(),
                key: "NO_SUCH_KEY".to_owned()
            }
        );
    }

    #[test]
    fn test_fingerprint_tracks_effective_config() {
        let v1 = InstanceTemplate::with_image("flask-app:v1")
            .add_env(EnvVar::from_config_map("LOG_LEVEL", "app-config", "LOG_LEVEL"));

        let fp1 = v1
            .resolve(&app_config(), &BTreeMap::new())
            .expect("resolve")
            .fingerprint();
        let fp1_again = v1
            .resolve(&app_config(), &BTreeMap::new())
            .expect("resolve")
            .fingerprint();
        assert_eq!(fp1, fp1_again);

        // image change
        let mut v2 = v1.clone();
        v2.image = "flask-app:v2".to_owned();
        let fp2 = v2
            .resolve(&app_config(), &BTreeMap::new())
            .expect("resolve")
            .fingerprint();
        assert_ne!(fp1, fp2);

        // same template, changed referenced value
        let mut changed = app_config();
        changed.insert(
            "app-config".to_owned(),
            ConfigMapSpec::from([("LOG_LEVEL", "debug")]),
        );
        let fp3 = v1
            .resolve(&changed, &BTreeMap::new())
            .expect("resolve")
            .fingerprint();
        assert_ne!(fp1, fp3);
    }

    #[test]
    fn test_template_validation() {
        assert!(InstanceTemplate::default().validate_config().is_some());
        assert!(InstanceTemplate::with_image("flask-app:v1")
            .validate_config()
            .is_none());

        let dup = InstanceTemplate::with_image("flask-app:v1")
            .add_env(EnvVar::literal("PORT", "5000"))
            .add_env(EnvVar::literal("PORT", "5001"));
        assert!(dup.validate_config().expect("error").contains("duplicate"));

        let mut bad_probe = InstanceTemplate::with_image("flask-app:v1");
        bad_probe.probes.readiness = Some(ProbeSpec {
            period_secs: 0,
            ..Default::default()
        });
        assert!(bad_probe
            .validate_config()
            .expect("error")
            .contains("readiness"));
    }
}
