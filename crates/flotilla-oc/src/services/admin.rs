//!
//! # Admin Surface
//!
//! The embedding-facing API over the shared metadata context: checked spec
//! writes with reference validation, two-phase deletes, snapshot reads, the
//! change event feed and the utilization ingest point. Spec writes land in
//! the store synchronously, so a returned generation is already committed;
//! control loops pick the change up through their own listeners.

use async_channel::Receiver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use flotilla_metadata::autoscaler::AutoscalerSpec;
use flotilla_metadata::configmap::ConfigMapSpec;
use flotilla_metadata::core::{MetadataItem, Spec};
use flotilla_metadata::deployment::DeploymentSpec;
use flotilla_metadata::deployment::store::DeploymentLocalStorePolicy;
use flotilla_metadata::extended::{ObjectType, SpecExt};
use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::labels::Labels;
use flotilla_metadata::secret::SecretSpec;
use flotilla_metadata::service::ServiceSpec;
use flotilla_metadata::store::{MetadataStoreObject, SpecWrite, SpecWriteError};
use flotilla_metadata::volume::VolumeSpec;
use flotilla_types::{Generation, ReplicaCount, UtilizationPercent};

use crate::core::SharedContext;
use crate::core::events::ChangeEvent;
use crate::core::metrics::UtilizationSample;
use crate::dispatcher::metadata::ObjMeta;
use crate::dispatcher::store::StoreContext;
use crate::error::ApiError;

/// Kind-tagged spec payload accepted by [`OcAdmin::apply`]. Instances are
/// absent on purpose: they are minted by the deployment reconciler and can
/// only be deleted through the admin surface, never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum ObjectSpec {
    Deployment(DeploymentSpec),
    Service(ServiceSpec),
    ConfigMap(ConfigMapSpec),
    Secret(SecretSpec),
    Volume(VolumeSpec),
    Autoscaler(AutoscalerSpec),
}

impl ObjectSpec {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Deployment(_) => ObjectType::Deployment,
            Self::Service(_) => ObjectType::Service,
            Self::ConfigMap(_) => ObjectType::ConfigMap,
            Self::Secret(_) => ObjectType::Secret,
            Self::Volume(_) => ObjectType::Volume,
            Self::Autoscaler(_) => ObjectType::Autoscaler,
        }
    }
}

/// one object as the admin surface reports it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "S: Serialize, S::Status: Serialize"))]
pub struct ObjectView<S>
where
    S: Spec<IndexKey = ObjectKey>,
{
    pub key: ObjectKey,
    pub generation: Generation,
    pub deleting: bool,
    pub spec: S,
    pub status: S::Status,
}

impl<S> ObjectView<S>
where
    S: Spec<IndexKey = ObjectKey>,
{
    fn from_object(object: MetadataStoreObject<S, ObjMeta>) -> Self {
        let generation = object.ctx().item().generation();
        let deleting = object.is_being_deleted();
        Self {
            key: object.key_owned(),
            generation,
            deleting,
            spec: object.spec,
            status: object.status,
        }
    }
}

/// spec and status of one object, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ObjectState {
    Deployment(ObjectView<DeploymentSpec>),
    Instance(ObjectView<InstanceSpec>),
    Service(ObjectView<ServiceSpec>),
    ConfigMap(ObjectView<ConfigMapSpec>),
    Secret(ObjectView<SecretSpec>),
    Volume(ObjectView<VolumeSpec>),
    Autoscaler(ObjectView<AutoscalerSpec>),
}

impl ObjectState {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Deployment(view) => &view.key,
            Self::Instance(view) => &view.key,
            Self::Service(view) => &view.key,
            Self::ConfigMap(view) => &view.key,
            Self::Secret(view) => &view.key,
            Self::Volume(view) => &view.key,
            Self::Autoscaler(view) => &view.key,
        }
    }

    pub fn deleting(&self) -> bool {
        match self {
            Self::Deployment(view) => view.deleting,
            Self::Instance(view) => view.deleting,
            Self::Service(view) => view.deleting,
            Self::ConfigMap(view) => view.deleting,
            Self::Secret(view) => view.deleting,
            Self::Volume(view) => view.deleting,
            Self::Autoscaler(view) => view.deleting,
        }
    }

    pub fn as_deployment(&self) -> Option<&ObjectView<DeploymentSpec>> {
        match self {
            Self::Deployment(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&ObjectView<InstanceSpec>> {
        match self {
            Self::Instance(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ObjectView<ServiceSpec>> {
        match self {
            Self::Service(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_volume(&self) -> Option<&ObjectView<VolumeSpec>> {
        match self {
            Self::Volume(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_autoscaler(&self) -> Option<&ObjectView<AutoscalerSpec>> {
        match self {
            Self::Autoscaler(view) => Some(view),
            _ => None,
        }
    }
}

/// Embedding-facing handle over the controller context. Clones are cheap
/// and all work against the same stores.
#[derive(Debug, Clone)]
pub struct OcAdmin {
    ctx: SharedContext,
}

impl OcAdmin {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Upsert an object's spec. An existing object is overwritten whatever
    /// its current generation; [`Self::apply_with_generation`] is the
    /// checked variant.
    #[instrument(skip(self, spec), fields(kind = %spec.object_type(), %key))]
    pub async fn apply(&self, key: ObjectKey, spec: ObjectSpec) -> Result<SpecWrite, ApiError> {
        self.apply_inner(key, spec, None).await
    }

    /// Upsert with optimistic concurrency: the write lands only if the
    /// object's generation still equals `expected`, otherwise the caller
    /// must re-read and retry.
    #[instrument(skip(self, spec), fields(kind = %spec.object_type(), %key, expected))]
    pub async fn apply_with_generation(
        &self,
        key: ObjectKey,
        spec: ObjectSpec,
        expected: Generation,
    ) -> Result<SpecWrite, ApiError> {
        self.apply_inner(key, spec, Some(expected)).await
    }

    async fn apply_inner(
        &self,
        key: ObjectKey,
        spec: ObjectSpec,
        presented: Option<Generation>,
    ) -> Result<SpecWrite, ApiError> {
        self.ensure_running()?;
        validate_key(&key)?;

        match spec {
            ObjectSpec::Deployment(spec) => {
                if let Some(error) = spec.validate_config() {
                    return Err(ApiError::validation(error));
                }
                self.validate_deployment_references(&key, &spec).await?;
                self.write(self.ctx.deployments(), key, spec, presented)
                    .await
            }
            ObjectSpec::Service(spec) => {
                if let Some(error) = spec.validate_config() {
                    return Err(ApiError::validation(error));
                }
                self.write(self.ctx.services(), key, spec, presented).await
            }
            ObjectSpec::ConfigMap(spec) => {
                self.write(self.ctx.configmaps(), key, spec, presented)
                    .await
            }
            ObjectSpec::Secret(spec) => self.write(self.ctx.secrets(), key, spec, presented).await,
            ObjectSpec::Volume(spec) => {
                if let Some(error) = spec.validate_config() {
                    return Err(ApiError::validation(error));
                }
                self.write(self.ctx.volumes(), key, spec, presented).await
            }
            ObjectSpec::Autoscaler(spec) => {
                if let Some(error) = spec.validate_config() {
                    return Err(ApiError::validation(error));
                }
                self.validate_autoscaler_target(&key, &spec).await?;
                self.write(self.ctx.autoscalers(), key, spec, presented)
                    .await
            }
        }
    }

    /// Request removal of an object. Kinds with teardown work (deployments
    /// drain their instances, instances stop their workload, volumes wait
    /// for claimants) are only marked; their control loop finalizes. Kinds
    /// nothing drains are marked and removed immediately.
    #[instrument(skip(self), fields(%kind, %key))]
    pub async fn delete(&self, kind: ObjectType, key: &ObjectKey) -> Result<(), ApiError> {
        self.ensure_running()?;

        match kind {
            ObjectType::Deployment => self.mark(self.ctx.deployments(), kind, key).await,
            ObjectType::Instance => self.mark(self.ctx.instances(), kind, key).await,
            ObjectType::Volume => self.mark(self.ctx.volumes(), kind, key).await,
            ObjectType::Service => self.mark_and_remove(self.ctx.services(), kind, key).await,
            ObjectType::ConfigMap => self.mark_and_remove(self.ctx.configmaps(), kind, key).await,
            ObjectType::Secret => self.mark_and_remove(self.ctx.secrets(), kind, key).await,
            ObjectType::Autoscaler => {
                self.mark_and_remove(self.ctx.autoscalers(), kind, key).await
            }
        }
    }

    /// Set a deployment's desired replica count through the same checked
    /// write path any other spec writer uses; a concurrent spec change
    /// surfaces as a conflict.
    #[instrument(skip(self), fields(%key, replicas))]
    pub async fn scale(
        &self,
        key: &ObjectKey,
        replicas: ReplicaCount,
    ) -> Result<SpecWrite, ApiError> {
        self.ensure_running()?;

        let Some(deployment) = self.ctx.deployments().store().value(key).await else {
            return Err(ApiError::not_found(ObjectType::Deployment, key.clone()));
        };
        let deployment = deployment.inner_owned();
        if deployment.is_being_deleted() {
            return Err(ApiError::validation(format!(
                "deployment '{key}' is being deleted"
            )));
        }

        let generation = deployment.ctx().item().generation();
        let mut spec = deployment.spec;
        spec.replicas = replicas;

        let write = self
            .ctx
            .deployments()
            .apply_spec(key.clone(), spec, Some(generation))
            .await
            .map_err(|err| write_error(ObjectType::Deployment, key.clone(), err))?;
        if write.changed {
            info!(generation = write.generation, "deployment scaled");
        }
        Ok(write)
    }

    /// Current spec and status of one object, including ones draining
    /// toward removal.
    pub async fn get_status(
        &self,
        kind: ObjectType,
        key: &ObjectKey,
    ) -> Result<ObjectState, ApiError> {
        let state = match kind {
            ObjectType::Deployment => {
                ObjectState::Deployment(self.view(self.ctx.deployments(), kind, key).await?)
            }
            ObjectType::Instance => {
                ObjectState::Instance(self.view(self.ctx.instances(), kind, key).await?)
            }
            ObjectType::Service => {
                ObjectState::Service(self.view(self.ctx.services(), kind, key).await?)
            }
            ObjectType::ConfigMap => {
                ObjectState::ConfigMap(self.view(self.ctx.configmaps(), kind, key).await?)
            }
            ObjectType::Secret => {
                ObjectState::Secret(self.view(self.ctx.secrets(), kind, key).await?)
            }
            ObjectType::Volume => {
                ObjectState::Volume(self.view(self.ctx.volumes(), kind, key).await?)
            }
            ObjectType::Autoscaler => {
                ObjectState::Autoscaler(self.view(self.ctx.autoscalers(), kind, key).await?)
            }
        };
        Ok(state)
    }

    /// Snapshot of one kind within a namespace, sorted by key. Objects
    /// already marked deleting are omitted. A label selector narrows
    /// deployments; other kinds carry no labels and reject one.
    pub async fn list(
        &self,
        kind: ObjectType,
        namespace: &str,
        selector: Option<&Labels>,
    ) -> Result<Vec<ObjectState>, ApiError> {
        if selector.is_some() && kind != ObjectType::Deployment {
            return Err(ApiError::validation(format!(
                "label selectors apply to deployments, not {kind}"
            )));
        }

        let mut states: Vec<ObjectState> = match kind {
            ObjectType::Deployment => {
                let store = self.ctx.deployments().store();
                let objects = match selector {
                    Some(selector) => store.matching(namespace, selector).await,
                    None => store.in_namespace(namespace).await,
                };
                objects
                    .into_iter()
                    .map(|object| ObjectState::Deployment(ObjectView::from_object(object)))
                    .collect()
            }
            ObjectType::Instance => {
                self.views(self.ctx.instances(), namespace, ObjectState::Instance)
                    .await
            }
            ObjectType::Service => {
                self.views(self.ctx.services(), namespace, ObjectState::Service)
                    .await
            }
            ObjectType::ConfigMap => {
                self.views(self.ctx.configmaps(), namespace, ObjectState::ConfigMap)
                    .await
            }
            ObjectType::Secret => {
                self.views(self.ctx.secrets(), namespace, ObjectState::Secret)
                    .await
            }
            ObjectType::Volume => {
                self.views(self.ctx.volumes(), namespace, ObjectState::Volume)
                    .await
            }
            ObjectType::Autoscaler => {
                self.views(self.ctx.autoscalers(), namespace, ObjectState::Autoscaler)
                    .await
            }
        };

        states.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(states)
    }

    /// recorded change events, optionally narrowed to a namespace and a
    /// start time
    pub async fn list_events(
        &self,
        namespace: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<ChangeEvent> {
        self.ctx.events().list(namespace, since).await
    }

    /// live stream of committed changes, optionally restricted to one kind
    pub async fn subscribe(&self, kind: Option<ObjectType>) -> Receiver<ChangeEvent> {
        self.ctx.events().subscribe(kind).await
    }

    /// One utilization readout for a running instance, as reported by an
    /// external metrics agent. Readouts for unknown instances are rejected
    /// rather than cached.
    pub async fn record_utilization(
        &self,
        instance: &ObjectKey,
        cpu_percent: UtilizationPercent,
        memory_percent: UtilizationPercent,
    ) -> Result<(), ApiError> {
        if !self.ctx.instances().store().contains_key(instance).await {
            return Err(ApiError::not_found(ObjectType::Instance, instance.clone()));
        }
        self.ctx
            .metrics()
            .record(
                instance.clone(),
                UtilizationSample::new(cpu_percent, memory_percent),
            )
            .await;
        Ok(())
    }

    /// latest recorded sample for an instance, if any
    pub async fn get_utilization(&self, instance: &ObjectKey) -> Option<UtilizationSample> {
        self.ctx.metrics().get(instance).await
    }

    fn ensure_running(&self) -> Result<(), ApiError> {
        if self.ctx.shutdown().is_set() {
            return Err(ApiError::Unavailable(
                "controller is shutting down".to_owned(),
            ));
        }
        Ok(())
    }

    async fn write<S>(
        &self,
        store: &StoreContext<S>,
        key: ObjectKey,
        spec: S,
        presented: Option<Generation>,
    ) -> Result<SpecWrite, ApiError>
    where
        S: Spec<IndexKey = ObjectKey> + SpecExt + PartialEq,
        S::Status: PartialEq,
    {
        let write = store
            .apply_spec(key.clone(), spec, presented)
            .await
            .map_err(|err| write_error(S::OBJECT_TYPE, key, err))?;
        if write.changed {
            info!(
                generation = write.generation,
                created = write.created,
                "spec applied"
            );
        }
        Ok(write)
    }

    async fn mark<S>(
        &self,
        store: &StoreContext<S>,
        kind: ObjectType,
        key: &ObjectKey,
    ) -> Result<(), ApiError>
    where
        S: Spec<IndexKey = ObjectKey> + PartialEq,
        S::Status: PartialEq,
    {
        store
            .mark_deleting(key)
            .await
            .map_err(|err| write_error(kind, key.clone(), err))?;
        info!("marked deleting");
        Ok(())
    }

    async fn mark_and_remove<S>(
        &self,
        store: &StoreContext<S>,
        kind: ObjectType,
        key: &ObjectKey,
    ) -> Result<(), ApiError>
    where
        S: Spec<IndexKey = ObjectKey> + PartialEq,
        S::Status: PartialEq,
    {
        store
            .mark_deleting(key)
            .await
            .map_err(|err| write_error(kind, key.clone(), err))?;
        store.delete_final(key.clone()).await;
        info!("removal queued");
        Ok(())
    }

    async fn view<S>(
        &self,
        store: &StoreContext<S>,
        kind: ObjectType,
        key: &ObjectKey,
    ) -> Result<ObjectView<S>, ApiError>
    where
        S: Spec<IndexKey = ObjectKey>,
    {
        store
            .store()
            .value(key)
            .await
            .map(|object| ObjectView::from_object(object.inner_owned()))
            .ok_or_else(|| ApiError::not_found(kind, key.clone()))
    }

    async fn views<S>(
        &self,
        store: &StoreContext<S>,
        namespace: &str,
        wrap: fn(ObjectView<S>) -> ObjectState,
    ) -> Vec<ObjectState>
    where
        S: Spec<IndexKey = ObjectKey>,
    {
        store
            .store()
            .read()
            .await
            .values()
            .filter(|object| object.key().namespace() == namespace && !object.is_being_deleted())
            .map(|object| wrap(ObjectView::from_object(object.inner().clone())))
            .collect()
    }

    /// template references and the storage claim must resolve within the
    /// key's namespace at submission time
    async fn validate_deployment_references(
        &self,
        key: &ObjectKey,
        spec: &DeploymentSpec,
    ) -> Result<(), ApiError> {
        let namespace = key.namespace();
        let (config_maps, secrets) = spec.template.references();

        for name in config_maps {
            if !self
                .object_exists(self.ctx.configmaps(), &key.with_name(name))
                .await
            {
                return Err(ApiError::validation(format!(
                    "config map '{name}' not found in namespace '{namespace}'"
                )));
            }
        }
        for name in secrets {
            if !self
                .object_exists(self.ctx.secrets(), &key.with_name(name))
                .await
            {
                return Err(ApiError::validation(format!(
                    "secret '{name}' not found in namespace '{namespace}'"
                )));
            }
        }
        if let Some(claim) = spec.claim() {
            if !self
                .object_exists(self.ctx.volumes(), &key.with_name(claim))
                .await
            {
                return Err(ApiError::validation(format!(
                    "volume claim '{claim}' not found in namespace '{namespace}'"
                )));
            }
        }
        Ok(())
    }

    /// the selector must resolve to at least one live deployment
    async fn validate_autoscaler_target(
        &self,
        key: &ObjectKey,
        spec: &AutoscalerSpec,
    ) -> Result<(), ApiError> {
        let matched = self
            .ctx
            .deployments()
            .store()
            .matching(key.namespace(), &spec.selector)
            .await;
        if matched.is_empty() {
            return Err(ApiError::validation(format!(
                "selector matches no deployment in namespace '{}'",
                key.namespace()
            )));
        }
        Ok(())
    }

    /// present and not already marked deleting
    async fn object_exists<S>(&self, store: &StoreContext<S>, key: &ObjectKey) -> bool
    where
        S: Spec<IndexKey = ObjectKey>,
    {
        store
            .store()
            .value(key)
            .await
            .is_some_and(|object| !object.is_being_deleted())
    }
}

fn validate_key(key: &ObjectKey) -> Result<(), ApiError> {
    if key.namespace().is_empty() {
        return Err(ApiError::validation("namespace must not be empty"));
    }
    if key.name().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    Ok(())
}

fn write_error(kind: ObjectType, key: ObjectKey, err: SpecWriteError) -> ApiError {
    match err {
        SpecWriteError::Conflict { presented, current } => ApiError::Conflict {
            key,
            presented,
            current,
        },
        SpecWriteError::Deleting => ApiError::validation(format!("{kind} '{key}' is being deleted")),
        SpecWriteError::NotFound => ApiError::not_found(kind, key),
    }
}

#[cfg(test)]
mod test {

    use flotilla_metadata::autoscaler::MetricTarget;
    use flotilla_metadata::deployment::StorageBacking;
    use flotilla_metadata::template::{EnvVar, InstanceTemplate};

    use crate::config::OcConfig;
    use crate::core::Context;
    use crate::error::StatusCode;
    use crate::runtime::SimulatedRuntime;

    use super::*;

    fn admin() -> OcAdmin {
        OcAdmin::new(Context::shared_metadata(
            OcConfig::default(),
            SimulatedRuntime::shared(),
        ))
    }

    fn web_deployment(replicas: ReplicaCount) -> ObjectSpec {
        ObjectSpec::Deployment(
            DeploymentSpec::new(replicas, InstanceTemplate::with_image("flask-app:v1"))
                .with_labels([("app", "web")]),
        )
    }

    #[tokio::test]
    async fn test_apply_validates_references() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        let template = InstanceTemplate::with_image("flask-app:v1").add_env(
            EnvVar::from_config_map("LOG_LEVEL", "app-config", "LOG_LEVEL"),
        );
        let spec = ObjectSpec::Deployment(DeploymentSpec::new(2, template));

        let err = admin
            .apply(key.clone(), spec.clone())
            .await
            .expect_err("dangling config map reference");
        assert_eq!(err.code(), StatusCode::ValidationError);
        assert!(err.to_string().contains("app-config"));

        admin
            .apply(
                key.with_name("app-config"),
                ObjectSpec::ConfigMap(ConfigMapSpec::from([("LOG_LEVEL", "info")])),
            )
            .await
            .expect("config map");
        let write = admin.apply(key, spec).await.expect("apply");
        assert!(write.created);
        assert_eq!(write.generation, 1);
    }

    #[tokio::test]
    async fn test_volume_claim_must_exist() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        let spec = ObjectSpec::Deployment(
            DeploymentSpec::new(1, InstanceTemplate::with_image("flask-app:v1")).with_storage(
                StorageBacking::PersistentClaim {
                    claim: "web-data".to_owned(),
                },
            ),
        );

        let err = admin
            .apply(key.clone(), spec.clone())
            .await
            .expect_err("missing claim");
        assert_eq!(err.code(), StatusCode::ValidationError);

        admin
            .apply(
                key.with_name("web-data"),
                ObjectSpec::Volume(VolumeSpec::new(512)),
            )
            .await
            .expect("volume");
        admin.apply(key, spec).await.expect("apply");
    }

    #[tokio::test]
    async fn test_reapply_unchanged_spec_keeps_generation() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        let first = admin
            .apply(key.clone(), web_deployment(3))
            .await
            .expect("apply");
        assert!(first.created && first.changed);

        let again = admin.apply(key, web_deployment(3)).await.expect("re-apply");
        assert!(!again.created && !again.changed);
        assert_eq!(again.generation, first.generation);
    }

    #[tokio::test]
    async fn test_apply_with_stale_generation_conflicts() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        admin
            .apply(key.clone(), web_deployment(3))
            .await
            .expect("apply");
        admin
            .apply(key.clone(), web_deployment(4))
            .await
            .expect("bump generation");

        let err = admin
            .apply_with_generation(key.clone(), web_deployment(5), 1)
            .await
            .expect_err("stale");
        assert_eq!(err.code(), StatusCode::Conflict);

        let write = admin
            .apply_with_generation(key, web_deployment(5), 2)
            .await
            .expect("fresh");
        assert_eq!(write.generation, 3);
    }

    #[tokio::test]
    async fn test_scale_updates_replicas() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        let missing = admin.scale(&key, 5).await.expect_err("nothing to scale");
        assert_eq!(missing.code(), StatusCode::NotFound);

        admin
            .apply(key.clone(), web_deployment(3))
            .await
            .expect("apply");
        let write = admin.scale(&key, 5).await.expect("scale");
        assert!(write.changed);

        let state = admin
            .get_status(ObjectType::Deployment, &key)
            .await
            .expect("status");
        assert_eq!(state.as_deployment().expect("deployment").spec.replicas, 5);

        // same count is a no-op
        let again = admin.scale(&key, 5).await.expect("scale again");
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn test_get_status_unknown_object() {
        let admin = admin();
        let err = admin
            .get_status(ObjectType::Service, &ObjectKey::new("prod", "missing"))
            .await
            .expect_err("not found");
        assert_eq!(err.code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn test_delete_marks_deployment_deleting() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web");

        admin
            .apply(key.clone(), web_deployment(2))
            .await
            .expect("apply");
        admin
            .delete(ObjectType::Deployment, &key)
            .await
            .expect("delete");

        // visible and flagged until the reconciler drains it
        let state = admin
            .get_status(ObjectType::Deployment, &key)
            .await
            .expect("status");
        assert!(state.deleting());

        // repeating the request is fine, writing to it is not
        admin
            .delete(ObjectType::Deployment, &key)
            .await
            .expect("delete again");
        let err = admin
            .apply(key, web_deployment(2))
            .await
            .expect_err("write to deleting object");
        assert_eq!(err.code(), StatusCode::ValidationError);
    }

    #[tokio::test]
    async fn test_delete_unknown_object() {
        let admin = admin();
        let err = admin
            .delete(ObjectType::ConfigMap, &ObjectKey::new("prod", "missing"))
            .await
            .expect_err("not found");
        assert_eq!(err.code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let admin = admin();

        admin
            .apply(ObjectKey::new("prod", "web"), web_deployment(2))
            .await
            .expect("web");
        admin
            .apply(
                ObjectKey::new("prod", "api"),
                ObjectSpec::Deployment(
                    DeploymentSpec::new(1, InstanceTemplate::with_image("api:v1"))
                        .with_labels([("app", "api")]),
                ),
            )
            .await
            .expect("api");
        admin
            .apply(ObjectKey::new("staging", "web"), web_deployment(1))
            .await
            .expect("staging web");

        let prod = admin
            .list(ObjectType::Deployment, "prod", None)
            .await
            .expect("list");
        assert_eq!(prod.len(), 2);
        assert_eq!(prod[0].key().name(), "api");
        assert_eq!(prod[1].key().name(), "web");

        let web_only = admin
            .list(
                ObjectType::Deployment,
                "prod",
                Some(&Labels::from([("app", "web")])),
            )
            .await
            .expect("selector list");
        assert_eq!(web_only.len(), 1);
        assert_eq!(web_only[0].key().name(), "web");
    }

    #[tokio::test]
    async fn test_list_selector_rejected_for_other_kinds() {
        let admin = admin();
        let err = admin
            .list(
                ObjectType::Service,
                "prod",
                Some(&Labels::from([("app", "web")])),
            )
            .await
            .expect_err("selector on services");
        assert_eq!(err.code(), StatusCode::ValidationError);
    }

    #[tokio::test]
    async fn test_list_omits_deleting_objects() {
        let admin = admin();
        let spec = ObjectSpec::Service(ServiceSpec::new([("app", "web")], 80));

        admin
            .apply(ObjectKey::new("prod", "web"), spec.clone())
            .await
            .expect("web");
        admin
            .apply(ObjectKey::new("prod", "api"), spec)
            .await
            .expect("api");
        admin
            .delete(ObjectType::Service, &ObjectKey::new("prod", "api"))
            .await
            .expect("delete");

        let listed = admin
            .list(ObjectType::Service, "prod", None)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key().name(), "web");
    }

    #[tokio::test]
    async fn test_autoscaler_requires_matching_deployment() {
        let admin = admin();
        let key = ObjectKey::new("prod", "web-scaler");
        let scaler = ObjectSpec::Autoscaler(
            AutoscalerSpec::new([("app", "web")], 1, 10).with_metric(MetricTarget::cpu(50)),
        );

        let err = admin
            .apply(key.clone(), scaler.clone())
            .await
            .expect_err("no target");
        assert_eq!(err.code(), StatusCode::ValidationError);

        admin
            .apply(ObjectKey::new("prod", "web"), web_deployment(2))
            .await
            .expect("deployment");
        admin.apply(key, scaler).await.expect("autoscaler");
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let admin = admin();
        let err = admin
            .apply(ObjectKey::new("prod", ""), web_deployment(1))
            .await
            .expect_err("empty name");
        assert_eq!(err.code(), StatusCode::ValidationError);

        let err = admin
            .apply(ObjectKey::new("", "web"), web_deployment(1))
            .await
            .expect_err("empty namespace");
        assert_eq!(err.code(), StatusCode::ValidationError);
    }

    #[tokio::test]
    async fn test_utilization_requires_known_instance() {
        let admin = admin();
        let instance = ObjectKey::new("prod", "web-abc12");

        let err = admin
            .record_utilization(&instance, 80, 40)
            .await
            .expect_err("unknown instance");
        assert_eq!(err.code(), StatusCode::NotFound);
        assert!(admin.get_utilization(&instance).await.is_none());

        // once the reconciler has minted the instance, readouts stick
        admin
            .ctx
            .instances()
            .apply_spec(instance.clone(), InstanceSpec::default(), None)
            .await
            .expect("instance");
        admin
            .record_utilization(&instance, 80, 40)
            .await
            .expect("record");
        let sample = admin.get_utilization(&instance).await.expect("sample");
        assert_eq!(sample.cpu_percent, 80);
        assert_eq!(sample.memory_percent, 40);
    }

    #[tokio::test]
    async fn test_shutdown_makes_writes_unavailable() {
        let admin = admin();
        admin.ctx.shutdown().notify();

        let err = admin
            .apply(ObjectKey::new("prod", "web"), web_deployment(1))
            .await
            .expect_err("shutting down");
        assert_eq!(err.code(), StatusCode::Unavailable);
    }

    #[test]
    fn test_object_spec_yaml_shape() {
        let yaml = r#"
kind: Deployment
spec:
  replicas: 3
  template:
    image: flask-app:v1
"#;
        let spec: ObjectSpec = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(spec.object_type(), ObjectType::Deployment);
        let ObjectSpec::Deployment(deployment) = spec else {
            panic!("wrong kind");
        };
        assert_eq!(deployment.replicas, 3);
        assert_eq!(deployment.template.image, "flask-app:v1");
    }
}
