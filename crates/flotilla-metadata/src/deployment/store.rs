//!
//! # Deployment Store
//!

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::MetadataItem;
use crate::key::ObjectKey;
use crate::labels::Labels;
use crate::store::*;

use super::*;

pub type SharedDeploymentStore<C> = Arc<DeploymentLocalStore<C>>;

pub type DeploymentMetadata<C> = MetadataStoreObject<DeploymentSpec, C>;
pub type DeploymentLocalStore<C> = LocalStore<DeploymentSpec, C>;

#[async_trait]
pub trait DeploymentLocalStorePolicy<C>
where
    C: MetadataItem,
{
    /// deployments in a namespace, skipping ones already marked deleting
    async fn in_namespace(&self, namespace: &str) -> Vec<DeploymentMetadata<C>>;

    /// deployments whose labels are selected by the given selector
    async fn matching(&self, namespace: &str, selector: &Labels) -> Vec<DeploymentMetadata<C>>;
}

#[async_trait]
impl<C> DeploymentLocalStorePolicy<C> for DeploymentLocalStore<C>
where
    C: MetadataItem,
{
    async fn in_namespace(&self, namespace: &str) -> Vec<DeploymentMetadata<C>> {
        self.read()
            .await
            .values()
            .filter(|d| d.key().namespace() == namespace && !d.is_being_deleted())
            .map(|d| d.inner().clone())
            .collect()
    }

    async fn matching(&self, namespace: &str, selector: &Labels) -> Vec<DeploymentMetadata<C>> {
        self.read()
            .await
            .values()
            .filter(|d| {
                d.key().namespace() == namespace
                    && !d.is_being_deleted()
                    && selector.selects(&d.spec.labels)
            })
            .map(|d| d.inner().clone())
            .collect()
    }
}

pub trait DeploymentMd<C: MetadataItem> {
    fn quick(key: impl Into<ObjectKey>, spec: DeploymentSpec) -> Self;
}

impl<C: MetadataItem> DeploymentMd<C> for DeploymentMetadata<C> {
    fn quick(key: impl Into<ObjectKey>, spec: DeploymentSpec) -> Self {
        Self::new(key.into(), spec, DeploymentStatus::default())
    }
}
