//!
//! # Per-instance probe task
//!
//! One task per up instance, multiplexing the startup, readiness and
//! liveness cadences of its template. The startup probe gates the other two
//! until its first success. Readiness flips the phase between Ready and
//! Running and never destroys; startup and liveness exhaustion mark the
//! instance Failed and leave replacement to the deployment reconciler.
//!
//! A probe that cannot be answered within its timeout counts as one failure.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use flotilla_metadata::instance::{InstancePhase, InstanceSpec, InstanceStatus, ProbeCounters};
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::template::{ProbeKind, ProbeSet, ProbeSpec};
use flotilla_types::event::StickyEvent;

use crate::runtime::{ProbeOutcome, SharedRuntime};
use crate::stores::StoreContext;

struct Scheduled {
    kind: ProbeKind,
    spec: ProbeSpec,
    due: Instant,
}

pub(crate) struct ProbeTask {
    key: ObjectKey,
    probes: ProbeSet,
    instances: StoreContext<InstanceSpec>,
    runtime: SharedRuntime,
    cancel: Arc<StickyEvent>,
}

impl ProbeTask {
    pub(crate) fn new(
        key: ObjectKey,
        probes: ProbeSet,
        instances: StoreContext<InstanceSpec>,
        runtime: SharedRuntime,
        cancel: Arc<StickyEvent>,
    ) -> Self {
        Self {
            key,
            probes,
            instances,
            runtime,
            cancel,
        }
    }

    pub(crate) async fn run(self) {
        debug!(key = %self.key, "probe task started");

        if self.probes.iter().next().is_none() {
            // no probes configured, running counts as ready
            self.mark_ready(ProbeCounters::default()).await;
            self.cancel.listen().await;
            return;
        }

        let started = Instant::now();
        let mut startup_passed = self.probes.startup.is_none();
        let mut counters = ProbeCounters::default();

        // liveness alone carries no readiness gate, launched counts as ready
        if startup_passed && self.probes.readiness.is_none() {
            self.mark_ready(counters).await;
        }

        let mut schedule: Vec<Scheduled> = self
            .probes
            .iter()
            .map(|(kind, spec)| Scheduled {
                kind,
                spec: *spec,
                due: started + spec.initial_delay(),
            })
            .collect();

        loop {
            if self.cancel.is_set() {
                break;
            }

            let Some(slot) = next_active(&mut schedule, startup_passed) else {
                // nothing left to watch, park until torn down
                self.cancel.listen().await;
                break;
            };

            let wait = slot.due.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = self.cancel.listen() => break,
                }
            }

            let spec = slot.spec;
            let kind = slot.kind;
            let outcome = match timeout(
                spec.timeout(),
                self.runtime.probe(&self.key, kind, &spec),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => ProbeOutcome::Unknown,
            };
            slot.due = Instant::now() + spec.period();

            let keep_going = match kind {
                ProbeKind::Startup => {
                    self.handle_startup(outcome, &spec, &mut startup_passed, &mut counters)
                        .await
                }
                ProbeKind::Readiness => {
                    self.handle_readiness(outcome, &spec, &mut counters).await
                }
                ProbeKind::Liveness => self.handle_liveness(outcome, &spec, &mut counters).await,
            };
            if !keep_going {
                break;
            }
        }

        debug!(key = %self.key, "probe task finished");
    }

    async fn handle_startup(
        &self,
        outcome: ProbeOutcome,
        spec: &ProbeSpec,
        startup_passed: &mut bool,
        counters: &mut ProbeCounters,
    ) -> bool {
        if outcome.is_healthy() {
            *startup_passed = true;
            counters.startup_failures = 0;
            debug!(key = %self.key, "startup probe passed");

            if self.probes.readiness.is_none() {
                // no readiness probe, started means ready
                return self.mark_ready(*counters).await;
            }
            return self.write_counters(*counters).await;
        }

        counters.startup_failures += 1;
        warn!(
            key = %self.key,
            failures = counters.startup_failures,
            threshold = spec.failure_threshold,
            "startup probe failed"
        );
        if counters.startup_failures >= spec.failure_threshold {
            self.mark_failed(
                format!(
                    "startup probe failed {} times",
                    counters.startup_failures
                ),
                *counters,
            )
            .await;
            return false;
        }
        self.write_counters(*counters).await
    }

    async fn handle_readiness(
        &self,
        outcome: ProbeOutcome,
        spec: &ProbeSpec,
        counters: &mut ProbeCounters,
    ) -> bool {
        if outcome.is_healthy() {
            counters.readiness_failures = 0;
            return self.mark_ready(*counters).await;
        }

        counters.readiness_failures += 1;
        debug!(
            key = %self.key,
            failures = counters.readiness_failures,
            threshold = spec.failure_threshold,
            "readiness probe failed"
        );
        if counters.readiness_failures >= spec.failure_threshold {
            return self.mark_unready(*counters).await;
        }
        self.write_counters(*counters).await
    }

    async fn handle_liveness(
        &self,
        outcome: ProbeOutcome,
        spec: &ProbeSpec,
        counters: &mut ProbeCounters,
    ) -> bool {
        if outcome.is_healthy() {
            counters.liveness_failures = 0;
            return self.write_counters(*counters).await;
        }

        counters.liveness_failures += 1;
        warn!(
            key = %self.key,
            failures = counters.liveness_failures,
            threshold = spec.failure_threshold,
            "liveness probe failed"
        );
        if counters.liveness_failures >= spec.failure_threshold {
            self.mark_failed(
                format!(
                    "liveness probe failed {} times",
                    counters.liveness_failures
                ),
                *counters,
            )
            .await;
            return false;
        }
        self.write_counters(*counters).await
    }

    async fn mark_ready(&self, counters: ProbeCounters) -> bool {
        self.apply_status(|status| {
            status.phase = InstancePhase::Ready;
            if status.ready_at.is_none() {
                status.ready_at = Some(Utc::now());
            }
            status.probes = counters;
            status.message = None;
        })
        .await
    }

    async fn mark_unready(&self, counters: ProbeCounters) -> bool {
        self.apply_status(|status| {
            if status.phase.is_ready() {
                status.phase = InstancePhase::Running;
                // availability clock restarts on the next readiness pass
                status.ready_at = None;
            }
            status.probes = counters;
        })
        .await
    }

    async fn mark_failed(&self, reason: String, counters: ProbeCounters) -> bool {
        warn!(key = %self.key, %reason, "instance marked failed");
        self.apply_status(|status| {
            status.phase = InstancePhase::Failed;
            status.probes = counters;
            status.message = Some(reason);
        })
        .await
    }

    async fn write_counters(&self, counters: ProbeCounters) -> bool {
        self.apply_status(|status| {
            status.probes = counters;
        })
        .await
    }

    /// re-read then write, so a probe result can never resurrect an
    /// instance that is draining or already failed; false once the
    /// instance is out of our hands
    async fn apply_status<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut InstanceStatus),
    {
        let Some(current) = self.instances.store().value(&self.key).await else {
            return false;
        };
        let current = current.inner_owned();
        if current.is_being_deleted()
            || matches!(
                current.status.phase,
                InstancePhase::Terminating | InstancePhase::Failed
            )
        {
            return false;
        }

        let mut status = current.status.clone();
        mutate(&mut status);
        if status != current.status {
            self.instances.update_status(self.key.clone(), status).await;
        }
        true
    }
}

/// earliest due slot among the probes active in the current stage
fn next_active(schedule: &mut [Scheduled], startup_passed: bool) -> Option<&mut Scheduled> {
    schedule
        .iter_mut()
        .filter(|slot| {
            if startup_passed {
                slot.kind != ProbeKind::Startup
            } else {
                slot.kind == ProbeKind::Startup
            }
        })
        .min_by_key(|slot| slot.due)
}
