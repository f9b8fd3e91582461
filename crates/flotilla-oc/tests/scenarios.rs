//!
//! End-to-end workload lifecycle against the full controller stack: fresh
//! deployments turning ready, bounded image rollouts, rollback of a stalled
//! rollout and utilization-driven scaling.

mod fixture;

use fixture::{TestEnv, versioned_deployment, wait_for, web_deployment, web_key};

use flotilla_metadata::autoscaler::{AutoscalerSpec, MetricTarget};
use flotilla_metadata::deployment::RolloutState;
use flotilla_metadata::extended::ObjectType;
use flotilla_metadata::key::ObjectKey;
use flotilla_oc::services::ObjectSpec;

#[tokio::test(flavor = "multi_thread")]
async fn test_fresh_deployment_converges_to_ready() {
    let env = TestEnv::start().await;
    let key = web_key();

    let write = env
        .admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply");
    assert!(write.created);
    assert_eq!(write.generation, 1);

    wait_for("deployment reports 3/3 ready", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 3 && view.status.rollout.state.is_stable()
    })
    .await;

    let view = env.deployment_view(&key).await;
    assert_eq!(view.generation, 1);
    assert_eq!(view.status.observed_generation, 1);
    assert_eq!(view.status.replicas, 3);
    assert_eq!(view.status.available_replicas, 3);
    assert!(view.status.is_available());
    assert!(!view.status.is_degraded());
    assert!(!view.status.rollout.stable_fingerprint.is_empty());

    assert_eq!(env.runtime.running_count().await, 3);
    for instance in env.runtime.running_keys().await {
        assert_eq!(
            env.runtime.image_of(&instance).await.as_deref(),
            Some("flask-app:v1")
        );
    }

    let deployments = env
        .admin
        .list(ObjectType::Deployment, "default", None)
        .await
        .expect("list deployments");
    assert_eq!(deployments.len(), 1);

    let instances = env
        .admin
        .list(ObjectType::Instance, "default", None)
        .await
        .expect("list instances");
    assert_eq!(instances.len(), 3);
    for state in &instances {
        let instance = state.as_instance().expect("instance view");
        assert!(instance.status.phase.is_ready());
        assert_eq!(instance.spec.owner_key, key);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_image_rollout_replaces_instances_within_bounds() {
    let env = TestEnv::start().await;
    let key = web_key();

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(3)))
        .await
        .expect("apply v1");
    wait_for("v1 ready", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 3 && view.status.rollout.state.is_stable()
    })
    .await;

    let v1_fingerprint = env
        .deployment_view(&key)
        .await
        .status
        .rollout
        .stable_fingerprint;
    let v1_keys = env.live_keys(&key).await;

    let write = env
        .admin
        .apply(
            key.clone(),
            ObjectSpec::Deployment(versioned_deployment(3, "flask-app:v2")),
        )
        .await
        .expect("apply v2");
    assert!(write.changed);
    assert_eq!(write.generation, 2);

    // default strategy: max_surge 1, max_unavailable 1. The bounds must
    // hold at every observable point of the rollout, not just at the end.
    wait_for("rollout settled on v2", async || {
        let live = env.live_instances(&key).await;
        assert!(live.len() <= 4, "surge bound exceeded: {} live", live.len());
        let ready = live.iter().filter(|i| i.status.phase.is_ready()).count();
        assert!(ready >= 2, "availability floor broken: {ready} ready");

        let view = env.deployment_view(&key).await;
        view.status.rollout.state.is_stable()
            && view.status.rollout.stable_fingerprint != v1_fingerprint
            && view.status.ready_replicas == 3
    })
    .await;

    let view = env.deployment_view(&key).await;
    assert_eq!(
        view.status
            .rollout
            .stable_template
            .as_ref()
            .map(|t| t.image.as_str()),
        Some("flask-app:v2")
    );

    wait_for("old instances torn down", async || {
        env.runtime.running_count().await == 3
    })
    .await;
    for instance in env.runtime.running_keys().await {
        assert_eq!(
            env.runtime.image_of(&instance).await.as_deref(),
            Some("flask-app:v2")
        );
    }

    let v2_keys = env.live_keys(&key).await;
    assert!(
        v2_keys.iter().all(|k| !v1_keys.contains(k)),
        "a rollout replaces instances, never mutates them"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_rollout_rolls_back_to_stable_template() {
    let env = TestEnv::start().await;
    let key = web_key();

    let mut spec = web_deployment(3);
    spec.strategy.progress_deadline_secs = 1;
    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(spec.clone()))
        .await
        .expect("apply v1");
    wait_for("v1 ready", async || {
        let view = env.deployment_view(&key).await;
        view.status.ready_replicas == 3 && view.status.rollout.state.is_stable()
    })
    .await;
    let v1_fingerprint = env
        .deployment_view(&key)
        .await
        .status
        .rollout
        .stable_fingerprint;

    // every v2 launch fails, so the rollout can make no progress
    env.runtime.fail_next_launches(100);
    let mut broken = spec;
    broken.template.image = "flask-app:v2".to_owned();
    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(broken))
        .await
        .expect("apply v2");

    wait_for("revert to the settled template", async || {
        let view = env.deployment_view(&key).await;
        view.spec.template.image == "flask-app:v1"
            && view.status.rollout.state == RolloutState::RollingBack
    })
    .await;

    let view = env.deployment_view(&key).await;
    // v1 apply, v2 apply, then the controller's revert
    assert_eq!(view.generation, 3);
    assert_eq!(
        view.status.rollout.reason.as_deref(),
        Some("ProgressDeadlineExceeded")
    );

    // replacements can launch again, the rollback completes
    env.runtime.fail_next_launches(0);
    wait_for("rollback settled", async || {
        let view = env.deployment_view(&key).await;
        view.status.rollout.state.is_stable()
            && view.status.rollout.stable_fingerprint == v1_fingerprint
            && view.status.ready_replicas == 3
    })
    .await;

    wait_for("only v1 instances remain", async || {
        env.runtime.running_count().await == 3
    })
    .await;
    for instance in env.runtime.running_keys().await {
        assert_eq!(
            env.runtime.image_of(&instance).await.as_deref(),
            Some("flask-app:v1")
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_autoscaler_follows_utilization_within_bounds() {
    let env = TestEnv::start().await;
    let key = web_key();
    let scaler_key = ObjectKey::new("default", "web-scaler");

    env.admin
        .apply(key.clone(), ObjectSpec::Deployment(web_deployment(2)))
        .await
        .expect("apply");
    wait_for("two ready replicas", async || {
        env.ready_count(&key).await == 2
    })
    .await;

    let mut policy = AutoscalerSpec::new([("app", "web")], 1, 4).with_metric(MetricTarget::cpu(50));
    policy.scale_up.stabilization_window_secs = 0;
    policy.scale_up.max_change_percent = 100;
    policy.scale_down.stabilization_window_secs = 0;
    policy.scale_down.max_change_percent = 100;
    env.admin
        .apply(scaler_key.clone(), ObjectSpec::Autoscaler(policy))
        .await
        .expect("apply autoscaler");

    // two replicas at 90% against a 50% target want four
    for instance in env.runtime.running_keys().await {
        env.runtime.set_utilization(&instance, 90, 30).await;
    }
    wait_for("scale up to the max bound", async || {
        let view = env.deployment_view(&key).await;
        assert!(
            (1..=4).contains(&view.spec.replicas),
            "replicas {} escaped the bounds",
            view.spec.replicas
        );
        view.spec.replicas == 4 && view.status.ready_replicas == 4
    })
    .await;

    wait_for("autoscaler status caught up", async || {
        let state = env
            .admin
            .get_status(ObjectType::Autoscaler, &scaler_key)
            .await
            .expect("autoscaler status");
        let scaler = state.as_autoscaler().expect("autoscaler view");
        scaler.status.current_replicas == 4 && scaler.status.last_scale_up.is_some()
    })
    .await;

    // idle instances shrink back to the min bound
    for instance in env.runtime.running_keys().await {
        env.runtime.set_utilization(&instance, 10, 5).await;
    }
    wait_for("scale down to the min bound", async || {
        let view = env.deployment_view(&key).await;
        assert!(
            (1..=4).contains(&view.spec.replicas),
            "replicas {} escaped the bounds",
            view.spec.replicas
        );
        view.spec.replicas == 1 && view.status.ready_replicas == 1
    })
    .await;

    wait_for("surplus instances torn down", async || {
        env.runtime.running_count().await == 1
    })
    .await;
}
