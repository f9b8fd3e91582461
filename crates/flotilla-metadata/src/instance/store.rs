//!
//! # Instance Store
//!
//! Instance metadata cached in the local controller. Ownership queries run
//! against the owner key carried in each instance spec; uid-level ownership
//! is available through the metadata context for callers holding the parent
//! item.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::MetadataItem;
use crate::key::ObjectKey;
use crate::store::*;

use super::*;

pub type SharedInstanceStore<C> = Arc<InstanceLocalStore<C>>;

pub type InstanceMetadata<C> = MetadataStoreObject<InstanceSpec, C>;
pub type InstanceLocalStore<C> = LocalStore<InstanceSpec, C>;

#[async_trait]
pub trait InstanceLocalStorePolicy<C>
where
    C: MetadataItem,
{
    /// all instances owned by the deployment, including terminating ones
    async fn owned_by(&self, owner: &ObjectKey) -> Vec<InstanceMetadata<C>>;

    /// ready instance count for the deployment
    async fn count_ready(&self, owner: &ObjectKey) -> u16;
}

#[async_trait]
impl<C> InstanceLocalStorePolicy<C> for InstanceLocalStore<C>
where
    C: MetadataItem,
{
    async fn owned_by(&self, owner: &ObjectKey) -> Vec<InstanceMetadata<C>> {
        self.read()
            .await
            .values()
            .filter(|i| &i.spec.owner_key == owner)
            .map(|i| i.inner().clone())
            .collect()
    }

    async fn count_ready(&self, owner: &ObjectKey) -> u16 {
        self.read()
            .await
            .values()
            .filter(|i| &i.spec.owner_key == owner && i.status.phase.is_ready())
            .count() as u16
    }
}

#[cfg(test)]
mod test {

    use flotilla_state_model::fixture::TestMeta;

    use crate::template::ResolvedTemplate;
    use crate::deployment::StorageBacking;
    use crate::instance::{InstancePhase, InstanceStatus};

    use super::*;

    fn instance(owner: &ObjectKey, name: &str, phase: InstancePhase) -> InstanceMetadata<TestMeta> {
        let spec = InstanceSpec::new(
            owner.clone(),
            ResolvedTemplate {
                image: "flask-app:v1".to_owned(),
                ..Default::default()
            },
            StorageBacking::Ephemeral,
        );
        InstanceMetadata::new(
            owner.with_name(name),
            spec,
            InstanceStatus::with_phase(phase),
        )
    }

    #[tokio::test]
    async fn test_ownership_queries() {
        let web = ObjectKey::named("web");
        let api = ObjectKey::named("api");

        let store = InstanceLocalStore::<TestMeta>::bulk_new(vec![
            instance(&web, "web-a1x9", InstancePhase::Ready),
            instance(&web, "web-k3m2", InstancePhase::Running),
            instance(&api, "api-b7c4", InstancePhase::Ready),
        ]);

        assert_eq!(store.owned_by(&web).await.len(), 2);
        assert_eq!(store.count_ready(&web).await, 1);
        assert_eq!(store.count_ready(&api).await, 1);
        assert_eq!(store.count_ready(&ObjectKey::named("gone")).await, 0);
    }
}
