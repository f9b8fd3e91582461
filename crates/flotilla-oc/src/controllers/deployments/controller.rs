//!
//! # Deployment Controller
//!
//! Level-triggered reconciler for Deployments. Each pass re-derives the
//! full picture from the stores, asks the reducer for a plan, and executes
//! it: child instances are created or marked for draining, stalled rollouts
//! are reverted onto the spec, and the observed status is written back.
//!
//! Spec writes race with the admin surface, so the revert path presents the
//! generation it read and backs off on conflict instead of overwriting a
//! newer intent.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_backoff::prelude::{Backoff, ExponentialBackoff};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use flotilla_metadata::condition::{Condition, ConditionType};
use flotilla_metadata::configmap::ConfigMapSpec;
use flotilla_metadata::core::MetadataItem;
use flotilla_metadata::deployment::{DeploymentLocalStorePolicy, DeploymentSpec, RolloutState};
use flotilla_metadata::instance::{InstanceLocalStorePolicy, InstancePhase, InstanceSpec};
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::secret::SecretSpec;
use flotilla_metadata::store::{ChangeListener, SpecWriteError};
use flotilla_metadata::template::{InstanceTemplate, ResolvedTemplate};
use flotilla_types::event::StickyEvent;

use crate::controllers::create_backoff;
use crate::core::SharedContext;
use crate::dispatcher::metadata::ObjMeta;
use crate::stores::StoreContext;
use crate::stores::deployment::DeploymentMetadata;
use crate::stores::instance::InstanceMetadata;

use super::reducer::{self, InstanceView, Plan, ReconcileInput};

type DeploymentMd = DeploymentMetadata<ObjMeta>;
type InstanceMd = InstanceMetadata<ObjMeta>;

const KEY_SUFFIX_LENGTH: usize = 5;
const MINT_ATTEMPTS: usize = 5;

struct RetryState {
    backoff: ExponentialBackoff,
    next: Instant,
}

pub struct DeploymentController {
    deployments: StoreContext<DeploymentSpec>,
    instances: StoreContext<InstanceSpec>,
    configmaps: StoreContext<ConfigMapSpec>,
    secrets: StoreContext<SecretSpec>,
    resync_interval: Duration,
    backoff_min: Duration,
    backoff_max: Duration,
    shutdown: Arc<StickyEvent>,
    retries: HashMap<ObjectKey, RetryState>,
}

impl DeploymentController {
    pub fn start(ctx: SharedContext) {
        let controller = Self {
            deployments: ctx.deployments().clone(),
            instances: ctx.instances().clone(),
            configmaps: ctx.configmaps().clone(),
            secrets: ctx.secrets().clone(),
            resync_interval: ctx.config().resync_interval,
            backoff_min: ctx.config().backoff_min,
            backoff_max: ctx.config().backoff_max,
            shutdown: ctx.shutdown().clone(),
            retries: HashMap::new(),
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "DeploymentControllerLoop")]
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

        debug!("initializing listeners");
        let mut deployment_listener = self.deployments.change_listener();
        let mut instance_listener = self.instances.change_listener();
        let mut configmap_listener = self.configmaps.change_listener();
        let mut secret_listener = self.secrets.change_listener();

        let initial = deployment_listener.wait_for_initial_sync().await;
        instance_listener.wait_for_initial_sync().await;
        configmap_listener.wait_for_initial_sync().await;
        secret_listener.wait_for_initial_sync().await;
        debug!(deployments = initial.len(), "initial sync");

        let mut dirty: BTreeSet<ObjectKey> = initial.iter().map(|d| d.key_owned()).collect();

        loop {
            self.drain_deployment_changes(&mut deployment_listener, &mut dirty)
                .await;
            self.drain_instance_changes(&mut instance_listener, &mut dirty)
                .await;
            self.drain_config_changes(&mut configmap_listener, &mut dirty)
                .await;
            self.drain_secret_changes(&mut secret_listener, &mut dirty)
                .await;
            self.collect_due_retries(&mut dirty);

            for key in std::mem::take(&mut dirty) {
                self.reconcile_deployment(&key).await;
            }

            let retry_wait = self.next_retry_wait();
            select! {
                _ = deployment_listener.listen() => {
                    debug!("detected deployment changes");
                },
                _ = instance_listener.listen() => {
                    debug!("detected instance changes");
                },
                _ = configmap_listener.listen() => {
                    debug!("detected configmap changes");
                },
                _ = secret_listener.listen() => {
                    debug!("detected secret changes");
                },
                _ = sleep(self.resync_interval) => {
                    debug!("periodic resync");
                    dirty.extend(self.deployments.store().clone_keys().await);
                },
                _ = sleep(retry_wait.unwrap_or(Duration::from_secs(3600))), if retry_wait.is_some() => {
                    debug!("retry timer due");
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }
        }
    }

    async fn drain_deployment_changes(
        &mut self,
        listener: &mut ChangeListener<DeploymentSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates {
            dirty.insert(object.key_owned());
        }
        for object in deletes {
            self.retries.remove(object.key());
            dirty.remove(object.key());
        }
    }

    /// instance changes dirty their owner
    async fn drain_instance_changes(
        &mut self,
        listener: &mut ChangeListener<InstanceSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates.iter().chain(deletes.iter()) {
            dirty.insert(object.spec.owner_key.clone());
        }
    }

    /// a config change may alter any resolved template in its namespace
    async fn drain_config_changes(
        &mut self,
        listener: &mut ChangeListener<ConfigMapSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates.iter().chain(deletes.iter()) {
            self.dirty_namespace(object.key().namespace(), dirty).await;
        }
    }

    async fn drain_secret_changes(
        &mut self,
        listener: &mut ChangeListener<SecretSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates.iter().chain(deletes.iter()) {
            self.dirty_namespace(object.key().namespace(), dirty).await;
        }
    }

    async fn dirty_namespace(&self, namespace: &str, dirty: &mut BTreeSet<ObjectKey>) {
        for deployment in self.deployments.store().in_namespace(namespace).await {
            dirty.insert(deployment.key_owned());
        }
    }

    fn collect_due_retries(&self, dirty: &mut BTreeSet<ObjectKey>) {
        let now = Instant::now();
        for (key, state) in &self.retries {
            if state.next <= now {
                dirty.insert(key.clone());
            }
        }
    }

    fn next_retry_wait(&self) -> Option<Duration> {
        self.retries
            .values()
            .map(|state| state.next)
            .min()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    #[instrument(skip(self))]
    async fn reconcile_deployment(&mut self, key: &ObjectKey) {
        let Some(deployment) = self.deployments.store().value(key).await else {
            self.retries.remove(key);
            return;
        };
        let deployment = deployment.inner_owned();

        if deployment.is_being_deleted() {
            self.retries.remove(key);
            self.drain_deployment(&deployment).await;
            return;
        }

        let (config_maps, secrets) = self.named_configs(key.namespace()).await;
        let resolved = match deployment.spec.template.resolve(&config_maps, &secrets) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.retries.remove(key);
                self.write_config_error(&deployment, err.to_string()).await;
                return;
            }
        };

        let now = Utc::now();
        let min_ready = deployment.spec.min_ready_secs;
        let owned = self.instances.store().owned_by(key).await;
        let input = ReconcileInput {
            desired: deployment.spec.replicas,
            strategy: deployment.spec.strategy,
            template: deployment.spec.template.clone(),
            fingerprint: resolved.fingerprint(),
            rollout: deployment.status.rollout.clone(),
            instances: owned
                .iter()
                .map(|i| Self::instance_view(i, min_ready, now))
                .collect(),
            now,
        };
        let plan = reducer::plan(&input);

        if let Some(template) = plan.revert_template.clone() {
            if !self.revert_spec(&deployment, template).await {
                // conflicting writer got there first, recompute on retry
                return;
            }
        }
        self.retries.remove(key);

        for _ in 0..plan.create {
            self.create_instance(&deployment, &resolved).await;
        }

        for victim in &plan.terminate {
            self.drain_instance(victim).await;
        }

        self.write_status(&deployment, &input, &plan, &owned).await;
    }

    /// Two-phase removal of the deployment itself: owned instances are
    /// drained first, the deployment leaves the store once the last one is
    /// finalized.
    async fn drain_deployment(&mut self, deployment: &DeploymentMd) {
        let owned = self.instances.store().owned_by(deployment.key()).await;
        if owned.is_empty() {
            debug!(key = %deployment.key(), "deployment drained, finalizing");
            self.deployments.delete_final(deployment.key_owned()).await;
            return;
        }

        for instance in owned {
            if !instance.is_being_deleted() {
                self.drain_instance(instance.key()).await;
            }
        }
    }

    async fn drain_instance(&mut self, key: &ObjectKey) {
        match self.instances.mark_deleting(key).await {
            Ok(_) => {
                debug!(instance = %key, "instance draining");
                if let Some(instance) = self.instances.store().value(key).await {
                    let mut status = instance.status.clone();
                    if status.phase != InstancePhase::Terminating {
                        status.phase = InstancePhase::Terminating;
                        self.instances.update_status(key.clone(), status).await;
                    }
                }
            }
            Err(SpecWriteError::NotFound) => {}
            Err(err) => {
                warn!(instance = %key, "instance drain failed: {err}");
            }
        }
    }

    async fn create_instance(&mut self, deployment: &DeploymentMd, resolved: &ResolvedTemplate) {
        let Some(key) = self.mint_instance_key(deployment.key()).await else {
            warn!(key = %deployment.key(), "could not mint a free instance key");
            return;
        };

        let spec = InstanceSpec::new(
            deployment.key_owned(),
            resolved.clone(),
            deployment.spec.storage.clone(),
        );
        match self
            .instances
            .create_child_spec(key.clone(), spec, deployment.ctx())
            .await
        {
            Ok(_) => {
                debug!(instance = %key, "instance created");
            }
            Err(err) => {
                warn!(instance = %key, "instance create failed: {err}");
            }
        }
    }

    async fn mint_instance_key(&self, owner: &ObjectKey) -> Option<ObjectKey> {
        for _ in 0..MINT_ATTEMPTS {
            let candidate = owner.with_name(format!("{}-{}", owner.name(), random_suffix()));
            if !self.instances.store().contains_key(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// CAS the settled template back onto the spec. False means a
    /// conflicting writer won and this pass should stop.
    async fn revert_spec(&mut self, deployment: &DeploymentMd, template: InstanceTemplate) -> bool {
        let key = deployment.key_owned();
        let generation = deployment.ctx().item().generation();
        let mut spec = deployment.spec.clone();
        spec.template = template;

        match self
            .deployments
            .apply_spec(key.clone(), spec, Some(generation))
            .await
        {
            Ok(_) => {
                info!(%key, "rollout stalled, reverted to last settled template");
                true
            }
            Err(SpecWriteError::Conflict { current, .. }) => {
                let wait = self.schedule_retry(&key);
                debug!(%key, current, retry_in = wait.as_secs(), "revert lost to a newer write");
                false
            }
            Err(err) => {
                warn!(%key, "revert failed: {err}");
                false
            }
        }
    }

    async fn write_config_error(&mut self, deployment: &DeploymentMd, message: String) {
        warn!(key = %deployment.key(), %message, "template resolution failed");

        let mut status = deployment.status.clone();
        status.observed_generation = deployment.ctx().item().generation();
        status.set_condition(
            Condition::new(ConditionType::Degraded, true)
                .with_reason("ConfigError")
                .with_message(message),
        );
        if status != deployment.status {
            self.deployments
                .update_status(deployment.key_owned(), status)
                .await;
        }
    }

    async fn write_status(
        &mut self,
        deployment: &DeploymentMd,
        input: &ReconcileInput,
        plan: &Plan,
        owned: &[InstanceMd],
    ) {
        let now = input.now;
        let min_ready = deployment.spec.min_ready_secs;
        let counted: Vec<&InstanceMd> = owned.iter().filter(|i| !i.is_being_deleted()).collect();
        let failed = counted
            .iter()
            .filter(|i| i.status.phase.is_failed())
            .count();
        let available = counted
            .iter()
            .filter(|i| i.status.is_available(min_ready, now))
            .count() as u16;

        let mut status = deployment.status.clone();
        status.observed_generation = deployment.ctx().item().generation();
        status.replicas = counted.len() as u16;
        status.ready_replicas = counted
            .iter()
            .filter(|i| i.status.phase.is_ready())
            .count() as u16;
        status.available_replicas = available;
        status.rollout = plan.rollout.clone();

        status.set_condition(if available >= deployment.spec.replicas {
            Condition::new(ConditionType::Available, true).with_reason("MinimumReplicasAvailable")
        } else {
            Condition::new(ConditionType::Available, false)
                .with_reason("MinimumReplicasUnavailable")
        });

        status.set_condition(match plan.rollout.state {
            RolloutState::RollingOut => {
                Condition::new(ConditionType::Progressing, true).with_reason("RolloutInProgress")
            }
            RolloutState::RollingBack => {
                let mut condition = Condition::new(ConditionType::Progressing, false);
                if let Some(reason) = &plan.rollout.reason {
                    condition = condition.with_reason(reason.clone());
                }
                condition
            }
            RolloutState::Stable => {
                let reason = if input.rollout.state == RolloutState::RollingBack {
                    "RolledBack"
                } else {
                    "RolloutComplete"
                };
                Condition::new(ConditionType::Progressing, true).with_reason(reason)
            }
        });

        status.set_condition(if failed > 0 {
            Condition::new(ConditionType::Degraded, true)
                .with_reason("InstanceFailure")
                .with_message(format!("{failed} instance(s) failed"))
        } else {
            Condition::new(ConditionType::Degraded, false)
        });

        if status != deployment.status {
            debug!(key = %deployment.key(), %status, "status updated");
            self.deployments
                .update_status(deployment.key_owned(), status)
                .await;
        }
    }

    fn instance_view(instance: &InstanceMd, min_ready_secs: u32, now: DateTime<Utc>) -> InstanceView {
        InstanceView {
            key: instance.key_owned(),
            fingerprint: instance.spec.fingerprint.clone(),
            phase: instance.status.phase,
            created_at: instance.spec.created_at,
            ready_at: instance.status.ready_at,
            being_deleted: instance.is_being_deleted(),
            available: instance.status.is_available(min_ready_secs, now),
        }
    }

    async fn named_configs(
        &self,
        namespace: &str,
    ) -> (
        BTreeMap<String, ConfigMapSpec>,
        BTreeMap<String, SecretSpec>,
    ) {
        let config_maps = self
            .configmaps
            .store()
            .read()
            .await
            .values()
            .filter(|c| c.key().namespace() == namespace && !c.is_being_deleted())
            .map(|c| (c.key().name().to_owned(), c.spec.clone()))
            .collect();
        let secrets = self
            .secrets
            .store()
            .read()
            .await
            .values()
            .filter(|s| s.key().namespace() == namespace && !s.is_being_deleted())
            .map(|s| (s.key().name().to_owned(), s.spec.clone()))
            .collect();
        (config_maps, secrets)
    }

    fn schedule_retry(&mut self, key: &ObjectKey) -> Duration {
        let min = self.backoff_min;
        let max = self.backoff_max;
        let state = self.retries.entry(key.clone()).or_insert_with(|| RetryState {
            backoff: create_backoff(min, max),
            next: Instant::now(),
        });
        let wait = state.backoff.wait();
        state.next = Instant::now() + wait;
        wait
    }
}

fn random_suffix() -> String {
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .take(KEY_SUFFIX_LENGTH)
        .collect()
}
