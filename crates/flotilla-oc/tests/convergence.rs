//!
//! Reconciliation properties: idempotent re-apply, scaling, replacement of
//! lost instances, cascading deletes, derived service endpoints, config
//! driven re-rolls, checked concurrent writes and claim finalization.

mod fixture;

use std::time::Duration;

use tokio::time::sleep;

use fixture::{TestEnv, wait_for, web_deployment, web_key};

use flotilla_metadata::configmap::ConfigMapSpec;
use flotilla_metadata::deployment::{DeploymentSpec, StorageBacking};
use flotilla_metadata::extended::ObjectType;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::service::ServiceSpec;
use flotilla_metadata::template::{EnvVar, InstanceTemplate};
use flotilla_metadata::volume::{VolumeResolution, VolumeSpec};
use flotilla_oc::ApiError;
use flotilla_oc::services::ObjectSpec;

#[tokio::test(flavor = "multi_thread")]
async fn test_reapply_changes_nothing() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply");
    wait_for("three ready replicas", async || {
        env.ready_count(&key).await == 3
    })
    .await;
    let keys_before = env.live_keys(&key).await;

    let write = env
        .admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("re-apply");
    assert!(!write.created);
    assert!(!write.changed);
    assert_eq!(write.generation, 1);

    // several resync passes later, nothing has churned
    sleep(Duration::from_millis(400)).await;
    assert_eq!(env.live_keys(&key).await, keys_before);
    assert_eq!(env.ready_count(&key).await, 3);
    assert_eq!(env.deployment_view(&key).await.generation, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scale_up_and_down_converges() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply");
    wait_for("three ready replicas", async || {
        env.ready_count(&key).await == 3
    })
    .await;
    let original = env.live_keys(&key).await;

    let write = env.admin.scale(&key, 5).await.expect("scale up");
    assert!(write.changed);
    assert_eq!(write.generation, 2);
    wait_for("five ready replicas", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 5 && env.runtime.running_count().await == 5
    })
    .await;

    // scaling up only adds, the original instances are untouched
    let grown = env.live_keys(&key).await;
    assert_eq!(grown.len(), 5);
    assert!(original.iter().all(|k| grown.contains(k)));

    env.admin.scale(&key, 2).await.expect("scale down");
    wait_for("two ready replicas", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 2
            && view.status.replicas == 2
            && env.runtime.running_count().await == 2
    })
    .await;
    let final_keys = env.live_keys(&key).await;
    assert!(final_keys.iter().all(|k| grown.contains(k)));
    assert_eq!(env.deployment_view(&key).await.spec.replicas, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_instance_is_replaced() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply");
    wait_for("three ready replicas", async || {
        env.ready_count(&key).await == 3
    })
    .await;

    let victim = env.live_keys(&key).await[0].clone();
    env.admin
        .delete(ObjectType::Instance, &victim)
        .await
        .expect("delete instance");

    wait_for("replacement ready", async || {
        let keys = env.live_keys(&key).await;
        !keys.contains(&victim)
            && env.ready_count(&key).await == 3
            && !env.runtime.is_running(&victim).await
            && env.runtime.running_count().await == 3
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cascade_delete_tears_everything_down() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply");
    wait_for("three ready replicas", async || {
        env.ready_count(&key).await == 3
    })
    .await;

    env.admin
        .delete(ObjectType::Deployment, &key)
        .await
        .expect("delete deployment");

    wait_for("deployment and instances gone", async || {
        env.admin
            .get_status(ObjectType::Deployment, &key)
            .await
            .is_err()
            && env.runtime.running_count().await == 0
            && env.ctx.instances().store().clone_keys().await.is_empty()
    })
    .await;

    let instances = env
        .admin
        .list(ObjectType::Instance, "default", None)
        .await
        .expect("list instances");
    assert!(instances.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_service_endpoints_track_ready_instances() {
    let env = TestEnv::start().await;
    let key = web_key();
    let svc_key = ObjectKey::new("default", "web-svc");

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(2)))
        .await
        .expect("apply deployment");
    env.admin
        .apply(
            svc_key.clone(),
            ObjectSpec::Service(ServiceSpec::new([("app", "web")], 8080)),
        )
        .await
        .expect("apply service");

    wait_for("two ready endpoints", async || {
        let Ok(state) = env.admin.get_status(ObjectType::Service, &svc_key).await else {
            return false;
        };
        let view = state.as_service().expect("service view");
        view.status.endpoints.len() == 2 && view.status.ready_count() == 2
    })
    .await;

    env.admin.scale(&key, 3).await.expect("scale");
    wait_for("three ready endpoints", async || {
        let Ok(state) = env.admin.get_status(ObjectType::Service, &svc_key).await else {
            return false;
        };
        state.as_service().expect("service view").status.ready_count() == 3
    })
    .await;

    env.admin
        .delete(ObjectType::Deployment, &key)
        .await
        .expect("delete deployment");
    wait_for("endpoints emptied", async || {
        let Ok(state) = env.admin.get_status(ObjectType::Service, &svc_key).await else {
            return false;
        };
        state.as_service().expect("service view").status.endpoints.is_empty()
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_edit_rolls_instances() {
    let env = TestEnv::start().await;
    let key = web_key();
    let config_key = ObjectKey::new("default", "app-config");

    env.admin
        .apply(
            config_key.clone(),
            ObjectSpec::ConfigMap(ConfigMapSpec::from([("LOG_LEVEL", "info")])),
        )
        .await
        .expect("apply configmap");

    let template = InstanceTemplate::with_image("flask-app:v1")
        .add_env(EnvVar::from_config_map("LOG_LEVEL", "app-config", "LOG_LEVEL"));
    let spec = DeploymentSpec::new(2, template).with_labels([("app", "web")]);
    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(spec))
        .await
        .expect("apply deployment");
    wait_for("two ready replicas", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 2 && view.status.rollout.state.is_stable()
    })
    .await;

    let before = env.deployment_view(&key).await;
    let old_fingerprint = before.status.rollout.stable_fingerprint;
    let old_keys = env.live_keys(&key).await;

    // the referenced value changes, so the resolved template does too
    env.admin
        .apply(
            config_key.clone(),
            ObjectSpec::ConfigMap(ConfigMapSpec::from([("LOG_LEVEL", "debug")])),
        )
        .await
        .expect("edit configmap");

    wait_for("instances re-rolled onto the new config", async || {
        let view = env.deployment_view(&key).await;
        view.status.rollout.state.is_stable()
            && view.status.rollout.stable_fingerprint != old_fingerprint
            && view.status.ready_replicas == 2
    })
    .await;

    let new_keys = env.live_keys(&key).await;
    assert!(new_keys.iter().all(|k| !old_keys.contains(k)));
    // the deployment spec itself was never written
    assert_eq!(env.deployment_view(&key).await.generation, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_checked_writes_single_winner() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(2)))
        .await
        .expect("apply");

    let (a, b) = tokio::join!(
        env.admin.apply_with_generation(
            key.clone(),
            ObjectSpec::Deployment(web_deployment(4)),
            1
        ),
        env.admin.apply_with_generation(
            key.clone(),
            ObjectSpec::Deployment(web_deployment(5)),
            1
        ),
    );

    let (winner_replicas, loser) = match (a, b) {
        (Ok(write), Err(err)) => {
            assert_eq!(write.generation, 2);
            (4u16, err)
        }
        (Err(err), Ok(write)) => {
            assert_eq!(write.generation, 2);
            (5u16, err)
        }
        (Ok(_), Ok(_)) => panic!("both checked writes landed"),
        (Err(a), Err(b)) => panic!("both checked writes failed: {a}; {b}"),
    };
    assert!(matches!(loser, ApiError::Conflict { current: 2, .. }));

    let view = env.deployment_view(&key).await;
    assert_eq!(view.generation, 2);
    assert_eq!(view.spec.replicas, winner_replicas);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_volume_removal_held_while_claimed() {
    let env = TestEnv::start().await;
    let key = web_key();
    let vol_key = ObjectKey::new("default", "web-data");

    env.admin
        .apply(vol_key.clone(), ObjectSpec::Volume(VolumeSpec::new(512)))
        .await
        .expect("apply volume");
    let state = env
        .admin
        .get_status(ObjectType::Volume, &vol_key)
        .await
        .expect("volume status");
    assert_eq!(
        state.as_volume().expect("volume view").status.resolution,
        VolumeResolution::Pending
    );

    let spec = web_deployment(1).with_storage(StorageBacking::PersistentClaim {
        claim: "web-data".to_owned(),
    });
    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(spec))
        .await
        .expect("apply deployment");
    wait_for("claim bound", async || {
        let Ok(state) = env.admin.get_status(ObjectType::Volume, &vol_key).await else {
            return false;
        };
        let view = state.as_volume().expect("volume view");
        view.status.resolution == VolumeResolution::Bound
            && view.status.bound_to.as_ref() == Some(&key)
    })
    .await;

    // removal is held while a deployment still names the claim
    env.admin
        .delete(ObjectType::Volume, &vol_key)
        .await
        .expect("delete volume");
    sleep(Duration::from_millis(300)).await;
    let state = env
        .admin
        .get_status(ObjectType::Volume, &vol_key)
        .await
        .expect("volume still present");
    assert!(state.deleting());

    env.admin
        .delete(ObjectType::Deployment, &key)
        .await
        .expect("delete deployment");
    wait_for("deployment and claim finalized", async || {
        env.admin
            .get_status(ObjectType::Deployment, &key)
            .await
            .is_err()
            && env
                .admin
                .get_status(ObjectType::Volume, &vol_key)
                .await
                .is_err()
    })
    .await;
}
