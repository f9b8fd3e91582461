//!
//! # Utilization metrics cache
//!
//! Latest utilization readout per instance, fed by an external agent
//! through the admin surface. Samples carry their arrival time; the
//! autoscaler only trusts samples younger than the configured staleness
//! bound and holds its previous decision when a window has none.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_lock::RwLock;
use chrono::{DateTime, Utc};

use flotilla_metadata::key::ObjectKey;
use flotilla_types::UtilizationPercent;

pub type SharedMetricsCache = Arc<MetricsCache>;

/// one utilization readout for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilizationSample {
    pub cpu_percent: UtilizationPercent,
    pub memory_percent: UtilizationPercent,
    pub recorded_at: DateTime<Utc>,
}

impl UtilizationSample {
    pub fn new(cpu_percent: UtilizationPercent, memory_percent: UtilizationPercent) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.recorded_at);
        age.num_milliseconds() <= staleness.as_millis() as i64
    }
}

#[derive(Debug, Default)]
pub struct MetricsCache {
    samples: RwLock<HashMap<ObjectKey, UtilizationSample>>,
}

impl MetricsCache {
    pub fn shared() -> SharedMetricsCache {
        Arc::new(Self::default())
    }

    /// overwrite the sample for an instance
    pub async fn record(&self, key: ObjectKey, sample: UtilizationSample) {
        self.samples.write().await.insert(key, sample);
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<UtilizationSample> {
        self.samples.read().await.get(key).copied()
    }

    /// sample for the instance only if it is within the staleness bound
    pub async fn fresh(
        &self,
        key: &ObjectKey,
        staleness: Duration,
        now: DateTime<Utc>,
    ) -> Option<UtilizationSample> {
        self.samples
            .read()
            .await
            .get(key)
            .filter(|sample| sample.is_fresh(staleness, now))
            .copied()
    }

    /// drop samples for instances that no longer exist
    pub async fn retain(&self, live: impl Fn(&ObjectKey) -> bool) {
        self.samples.write().await.retain(|key, _| live(key));
    }
}
