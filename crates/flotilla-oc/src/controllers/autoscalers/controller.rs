//!
//! # Autoscaler Controller
//!
//! Periodic evaluator for horizontal scaling policies. Each tick pulls
//! utilization from the runtime into the metrics cache, averages the fresh
//! samples per matched deployment, and writes the dampened replica target
//! back as a checked spec write. A conflicting writer wins the tick; the
//! next evaluation re-reads whatever landed.
//!
//! The loop is timer-driven on purpose: every evaluation stamps the
//! autoscaler status, so change events from its own writes carry no signal
//! worth waking on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use flotilla_metadata::autoscaler::{AutoscalerSpec, AutoscalerStatus, MetricResource};
use flotilla_metadata::core::MetadataItem;
use flotilla_metadata::deployment::{DeploymentLocalStorePolicy, DeploymentSpec};
use flotilla_metadata::instance::{InstanceLocalStorePolicy, InstanceSpec};
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::store::SpecWriteError;
use flotilla_types::{ReplicaCount, UtilizationPercent};
use flotilla_types::event::StickyEvent;

use crate::core::SharedContext;
use crate::core::metrics::{SharedMetricsCache, UtilizationSample};
use crate::dispatcher::metadata::ObjMeta;
use crate::runtime::SharedRuntime;
use crate::stores::StoreContext;
use crate::stores::autoscaler::AutoscalerMetadata;
use crate::stores::deployment::DeploymentMetadata;

type AutoscalerMd = AutoscalerMetadata<ObjMeta>;
type DeploymentMd = DeploymentMetadata<ObjMeta>;

pub struct AutoscalerController {
    autoscalers: StoreContext<AutoscalerSpec>,
    deployments: StoreContext<DeploymentSpec>,
    instances: StoreContext<InstanceSpec>,
    metrics: SharedMetricsCache,
    runtime: SharedRuntime,
    interval: Duration,
    staleness: Duration,
    shutdown: Arc<StickyEvent>,
}

impl AutoscalerController {
    pub fn start(ctx: SharedContext) {
        let controller = Self {
            autoscalers: ctx.autoscalers().clone(),
            deployments: ctx.deployments().clone(),
            instances: ctx.instances().clone(),
            metrics: ctx.metrics().clone(),
            runtime: ctx.runtime().clone(),
            interval: ctx.config().autoscaler_interval,
            staleness: ctx.config().metrics_staleness,
            shutdown: ctx.shutdown().clone(),
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "AutoscalerControllerLoop")]
    async fn dispatch_loop(mut self) {
        info!("started");
        loop {
            if let Err(err) = self.inner_loop().await {
                error!("error with inner loop: {:#?}", err);
                debug!("sleeping 10 seconds try again");
                sleep(Duration::from_secs(10)).await;
            }
            if self.shutdown.is_set() {
                info!("shutdown");
                break;
            }
        }
    }

    async fn inner_loop(&mut self) -> Result<()> {
        use tokio::select;

        debug!("waiting for initial sync");
        self.autoscalers
            .change_listener()
            .wait_for_initial_sync()
            .await;
        self.deployments
            .change_listener()
            .wait_for_initial_sync()
            .await;
        self.instances
            .change_listener()
            .wait_for_initial_sync()
            .await;
        debug!("initial sync");

        loop {
            select! {
                _ = sleep(self.interval) => {
                    self.evaluate_tick().await;
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }
        }
    }

    async fn evaluate_tick(&self) {
        let now = Utc::now();
        self.collect_runtime_samples().await;
        self.prune_samples().await;

        for autoscaler in self.autoscalers.store().clone_values().await {
            if autoscaler.is_being_deleted() {
                continue;
            }
            self.evaluate_autoscaler(&autoscaler, now).await;
        }
    }

    /// The runtime doubles as a metrics source: whatever it reports lands
    /// in the same cache the admin feed writes to, newest sample wins.
    async fn collect_runtime_samples(&self) {
        for instance in self.instances.store().clone_values().await {
            if instance.is_being_deleted() || !instance.status.phase.is_up() {
                continue;
            }
            if let Some((cpu, memory)) = self.runtime.utilization(instance.key()).await {
                self.metrics
                    .record(instance.key_owned(), UtilizationSample::new(cpu, memory))
                    .await;
            }
        }
    }

    async fn prune_samples(&self) {
        let live: HashSet<ObjectKey> = self
            .instances
            .store()
            .clone_keys()
            .await
            .into_iter()
            .collect();
        self.metrics.retain(|key| live.contains(key)).await;
    }

    #[instrument(skip(self, autoscaler, now), fields(key = %autoscaler.key()))]
    async fn evaluate_autoscaler(&self, autoscaler: &AutoscalerMd, now: DateTime<Utc>) {
        let matched = self
            .deployments
            .store()
            .matching(autoscaler.key().namespace(), &autoscaler.spec.selector)
            .await;

        let mut status = autoscaler.status.clone();
        status.last_evaluated = Some(now);
        status.current_replicas = 0;
        status.desired_replicas = 0;

        let mut scaled_up = false;
        let mut scaled_down = false;

        for deployment in &matched {
            let current = deployment.spec.replicas;
            status.current_replicas += current;

            let observed = self.observed_for(deployment.key(), now).await;
            let Some(eval) =
                evaluate(&autoscaler.spec, &autoscaler.status, current, &observed, now)
            else {
                // no usable signal, hold whatever the spec says
                status.desired_replicas += current;
                continue;
            };
            status.desired_replicas += eval.desired;

            let Some(next) = eval.next else {
                continue;
            };
            if self.scale_deployment(deployment, next).await {
                if next > current {
                    scaled_up = true;
                } else {
                    scaled_down = true;
                }
            }
        }

        if scaled_up {
            status.last_scale_up = Some(now);
        }
        if scaled_down {
            status.last_scale_down = Some(now);
        }

        if status != autoscaler.status {
            self.autoscalers
                .update_status(autoscaler.key_owned(), status)
                .await;
        }
    }

    /// fresh-sample averages per resource across the deployment's live
    /// instances
    async fn observed_for(
        &self,
        owner: &ObjectKey,
        now: DateTime<Utc>,
    ) -> HashMap<MetricResource, UtilizationPercent> {
        let mut cpu: Vec<u64> = vec![];
        let mut memory: Vec<u64> = vec![];
        for instance in self.instances.store().owned_by(owner).await {
            if instance.is_being_deleted() || !instance.status.phase.is_up() {
                continue;
            }
            if let Some(sample) = self.metrics.fresh(instance.key(), self.staleness, now).await {
                cpu.push(sample.cpu_percent as u64);
                memory.push(sample.memory_percent as u64);
            }
        }

        let mut observed = HashMap::new();
        if let Some(avg) = average(&cpu) {
            observed.insert(MetricResource::Cpu, avg);
        }
        if let Some(avg) = average(&memory) {
            observed.insert(MetricResource::Memory, avg);
        }
        observed
    }

    async fn scale_deployment(&self, deployment: &DeploymentMd, replicas: ReplicaCount) -> bool {
        let key = deployment.key_owned();
        let generation = deployment.ctx().item().generation();
        let mut spec = deployment.spec.clone();
        let from = spec.replicas;
        spec.replicas = replicas;

        match self
            .deployments
            .apply_spec(key.clone(), spec, Some(generation))
            .await
        {
            Ok(_) => {
                info!(%key, from, to = replicas, "scaled deployment");
                true
            }
            Err(SpecWriteError::Conflict { current, .. }) => {
                debug!(%key, current, "scale lost to a newer write, holding until next tick");
                false
            }
            Err(err) => {
                warn!(%key, "scale failed: {err}");
                false
            }
        }
    }
}

fn average(values: &[u64]) -> Option<UtilizationPercent> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().sum();
    Some((sum / values.len() as u64) as UtilizationPercent)
}

struct Evaluation {
    /// replica count to write now, `None` to hold
    next: Option<ReplicaCount>,
    /// clamped goal the metrics ask for, recorded in status
    desired: ReplicaCount,
}

/// One scaling decision. `None` means there was no fresh observation to
/// decide on, so the previous decision stands untouched.
fn evaluate(
    spec: &AutoscalerSpec,
    status: &AutoscalerStatus,
    current: ReplicaCount,
    observed: &HashMap<MetricResource, UtilizationPercent>,
    now: DateTime<Utc>,
) -> Option<Evaluation> {
    // scaled to zero is operator intent, never resurrect from here
    if current == 0 {
        return None;
    }

    let mut goal: Option<ReplicaCount> = None;
    for metric in &spec.metrics {
        if let Some(value) = observed.get(&metric.resource) {
            let want = metric.desired(current, *value);
            goal = Some(goal.map_or(want, |g| g.max(want)));
        }
    }
    let goal = spec.clamp(goal?);

    if goal == current {
        return Some(Evaluation {
            next: None,
            desired: goal,
        });
    }

    let up = goal > current;
    let policy = if up { &spec.scale_up } else { &spec.scale_down };
    if let Some(secs) = status.since_last(up, now) {
        if secs < policy.stabilization_window_secs as i64 {
            return Some(Evaluation {
                next: None,
                desired: goal,
            });
        }
    }

    let step = policy.max_step(current);
    let next = if up {
        goal.min(current.saturating_add(step))
    } else {
        goal.max(current.saturating_sub(step))
    };
    Some(Evaluation {
        next: Some(next),
        desired: goal,
    })
}
