//!
//! # Autoscaler Spec
//!
//! Horizontal scaling policy bound to Deployments by label selector. The
//! selector is resolved at evaluation time, never cached as ownership.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use flotilla_types::{ReplicaCount, UtilizationPercent};
use flotilla_types::defaults::{
    SCALE_DOWN_MAX_CHANGE_PERCENT, SCALE_DOWN_STABILIZATION_SEC, SCALE_UP_MAX_CHANGE_PERCENT,
    SCALE_UP_STABILIZATION_SEC,
};

use crate::labels::Labels;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoscalerSpec {
    pub selector: Labels,
    pub min_replicas: ReplicaCount,
    pub max_replicas: ReplicaCount,
    pub metrics: Vec<MetricTarget>,
    pub scale_up: ScalingPolicy,
    pub scale_down: ScalingPolicy,
}

impl Default for AutoscalerSpec {
    fn default() -> Self {
        Self {
            selector: Labels::default(),
            min_replicas: 0,
            max_replicas: 0,
            metrics: vec![],
            scale_up: ScalingPolicy::scale_up_default(),
            scale_down: ScalingPolicy::scale_down_default(),
        }
    }
}

impl AutoscalerSpec {
    pub fn new(selector: impl Into<Labels>, min_replicas: ReplicaCount, max_replicas: ReplicaCount) -> Self {
        Self {
            selector: selector.into(),
            min_replicas,
            max_replicas,
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: MetricTarget) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn clamp(&self, desired: ReplicaCount) -> ReplicaCount {
        desired.clamp(self.min_replicas, self.max_replicas)
    }

    /// validate configuration, return string with errors
    pub fn validate_config(&self) -> Option<String> {
        if self.selector.is_empty() {
            return Some("selector must not be empty".to_owned());
        }
        if self.min_replicas > self.max_replicas {
            return Some(format!(
                "min_replicas {} exceeds max_replicas {}",
                self.min_replicas, self.max_replicas
            ));
        }
        if self.metrics.is_empty() {
            return Some("at least one metric target is required".to_owned());
        }
        for metric in &self.metrics {
            if metric.target_utilization_percent == 0 {
                return Some(format!(
                    "{} target utilization must be at least 1",
                    metric.resource
                ));
            }
        }
        if self.scale_up.max_change_percent == 0 || self.scale_down.max_change_percent == 0 {
            return Some("max_change_percent must be at least 1".to_owned());
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    pub resource: MetricResource,
    pub target_utilization_percent: UtilizationPercent,
}

impl MetricTarget {
    pub fn cpu(target_utilization_percent: UtilizationPercent) -> Self {
        Self {
            resource: MetricResource::Cpu,
            target_utilization_percent,
        }
    }

    pub fn memory(target_utilization_percent: UtilizationPercent) -> Self {
        Self {
            resource: MetricResource::Memory,
            target_utilization_percent,
        }
    }

    /// replicas needed to bring `observed` utilization down to the target,
    /// computed as ceil(current * observed / target)
    pub fn desired(&self, current: ReplicaCount, observed: UtilizationPercent) -> ReplicaCount {
        if current == 0 {
            return 0;
        }
        let target = self.target_utilization_percent as u64;
        let scaled = current as u64 * observed as u64;
        let desired = scaled.div_ceil(target);
        desired.min(ReplicaCount::MAX as u64) as ReplicaCount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricResource {
    Cpu,
    Memory,
}

impl fmt::Display for MetricResource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// dampening applied to one scaling direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScalingPolicy {
    pub stabilization_window_secs: u32,
    /// cap on one adjustment, percent of current replicas
    pub max_change_percent: u32,
}

impl ScalingPolicy {
    pub fn scale_up_default() -> Self {
        Self {
            stabilization_window_secs: SCALE_UP_STABILIZATION_SEC,
            max_change_percent: SCALE_UP_MAX_CHANGE_PERCENT,
        }
    }

    pub fn scale_down_default() -> Self {
        Self {
            stabilization_window_secs: SCALE_DOWN_STABILIZATION_SEC,
            max_change_percent: SCALE_DOWN_MAX_CHANGE_PERCENT,
        }
    }

    pub fn stabilization_window(&self) -> Duration {
        Duration::from_secs(self.stabilization_window_secs as u64)
    }

    /// largest replica step allowed from `current` in this direction
    pub fn max_step(&self, current: ReplicaCount) -> ReplicaCount {
        let step = (current as u64 * self.max_change_percent as u64) / 100;
        // a non-zero policy always permits at least one replica of movement
        step.clamp(1, ReplicaCount::MAX as u64) as ReplicaCount
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_desired_formula() {
        let cpu = MetricTarget::cpu(50);

        // 3 replicas at 80% against a 50% target wants ceil(4.8) = 5
        assert_eq!(cpu.desired(3, 80), 5);
        // at target, stay put
        assert_eq!(cpu.desired(3, 50), 3);
        // under target, shrink
        assert_eq!(cpu.desired(4, 20), 2);
        assert_eq!(cpu.desired(3, 0), 0);
        assert_eq!(cpu.desired(0, 80), 0);
    }

    #[test]
    fn test_max_step() {
        let policy = ScalingPolicy {
            stabilization_window_secs: 60,
            max_change_percent: 50,
        };
        assert_eq!(policy.max_step(4), 2);
        assert_eq!(policy.max_step(1), 1);

        let full = ScalingPolicy {
            stabilization_window_secs: 60,
            max_change_percent: 100,
        };
        assert_eq!(full.max_step(3), 3);
    }

    #[test]
    fn test_validation() {
        let good = AutoscalerSpec::new([("app", "web")], 1, 10).with_metric(MetricTarget::cpu(50));
        assert!(good.validate_config().is_none());

        let inverted = AutoscalerSpec::new([("app", "web")], 5, 2).with_metric(MetricTarget::cpu(50));
        assert!(inverted.validate_config().expect("error").contains("min_replicas"));

        let no_metrics = AutoscalerSpec::new([("app", "web")], 1, 10);
        assert!(no_metrics.validate_config().is_some());

        let zero_target =
            AutoscalerSpec::new([("app", "web")], 1, 10).with_metric(MetricTarget::cpu(0));
        assert!(zero_target.validate_config().is_some());
    }

    #[test]
    fn test_clamp() {
        let spec = AutoscalerSpec::new([("app", "web")], 2, 6).with_metric(MetricTarget::cpu(50));
        assert_eq!(spec.clamp(0), 2);
        assert_eq!(spec.clamp(4), 4);
        assert_eq!(spec.clamp(9), 6);
    }
}
