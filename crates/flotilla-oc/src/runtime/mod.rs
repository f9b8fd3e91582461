//!
//! # Instance runtime boundary
//!
//! The component that actually launches, terminates and probes workload
//! instances lives behind this trait. The daemon ships with an in-memory
//! simulation; a production build would back it with a container engine.
//! Callers bound every operation with their own timeout, an elapsed wait
//! counts as a failure.

mod memory;

pub use memory::SimulatedRuntime;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::template::{ProbeKind, ProbeSpec};
use flotilla_types::UtilizationPercent;

pub type SharedRuntime = Arc<dyn InstanceRuntime>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("launch of {key} failed: {reason}")]
    LaunchFailed { key: ObjectKey, reason: String },
    #[error("terminate of {key} failed: {reason}")]
    TerminateFailed { key: ObjectKey, reason: String },
}

/// answer to one health probe
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    #[default]
    Healthy,
    Unhealthy,
    /// probe could not be answered; counts as a failure
    Unknown,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[async_trait]
pub trait InstanceRuntime: Debug + Send + Sync + 'static {
    /// start the workload for an instance
    async fn launch(&self, key: &ObjectKey, spec: &InstanceSpec) -> Result<(), RuntimeError>;

    /// stop the workload; terminating an unknown instance is a no-op
    async fn terminate(&self, key: &ObjectKey) -> Result<(), RuntimeError>;

    /// answer a single health probe for a running instance
    async fn probe(&self, key: &ObjectKey, kind: ProbeKind, spec: &ProbeSpec) -> ProbeOutcome;

    /// latest utilization relative to the instance resource request
    async fn utilization(&self, key: &ObjectKey)
    -> Option<(UtilizationPercent, UtilizationPercent)>;
}
