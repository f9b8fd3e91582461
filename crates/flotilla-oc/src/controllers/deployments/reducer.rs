//!
//! # Deployment Reducer
//!
//! Side-effect-free diff between a deployment's desired state and its owned
//! instances. The controller feeds it a snapshot and executes the returned
//! plan, so everything here is deterministic and directly testable.
//!
//! One pass never plans more change than the rollout strategy allows: new
//! instances are created up to `max_surge` above desired, and instances
//! still serving are drained only while available count stays at or above
//! `desired - max_unavailable`. Convergence comes from repeated passes as
//! replacements turn ready.

use chrono::{DateTime, Utc};

use flotilla_metadata::deployment::{RolloutState, RolloutStatus, RolloutStrategy};
use flotilla_metadata::instance::InstancePhase;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::template::InstanceTemplate;
use flotilla_types::ReplicaCount;

pub(crate) const REASON_PROGRESS_DEADLINE: &str = "ProgressDeadlineExceeded";

/// one owned instance as the reducer sees it
#[derive(Debug, Clone)]
pub(crate) struct InstanceView {
    pub key: ObjectKey,
    pub fingerprint: String,
    pub phase: InstancePhase,
    pub created_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub being_deleted: bool,
    /// ready, and ready long enough to satisfy `min_ready_secs`
    pub available: bool,
}

/// deployment-side inputs for one reconcile pass
#[derive(Debug, Clone)]
pub(crate) struct ReconcileInput {
    pub desired: ReplicaCount,
    pub strategy: RolloutStrategy,
    /// the spec template as written, recorded as known-good on settle
    pub template: InstanceTemplate,
    /// fingerprint of the resolved template
    pub fingerprint: String,
    pub rollout: RolloutStatus,
    pub instances: Vec<InstanceView>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
    /// instances to create from the resolved template
    pub create: ReplicaCount,
    /// instances to drain, worst first
    pub terminate: Vec<ObjectKey>,
    /// next rollout bookkeeping
    pub rollout: RolloutStatus,
    /// template to CAS back onto the spec when a stalled rollout is
    /// abandoned
    pub revert_template: Option<InstanceTemplate>,
}

pub(crate) fn plan(input: &ReconcileInput) -> Plan {
    let mut rollout = input.rollout.clone();
    let desired = input.desired as usize;

    // first pass over a fresh deployment, its template starts as known-good
    if rollout.stable_fingerprint.is_empty() {
        rollout.settle(input.fingerprint.clone(), input.template.clone());
    }

    // failed instances are drained unconditionally; the create math below
    // replaces them since they no longer count as live
    let mut terminate: Vec<ObjectKey> = input
        .instances
        .iter()
        .filter(|i| !i.being_deleted && i.phase.is_failed())
        .map(|i| i.key.clone())
        .collect();

    let live: Vec<&InstanceView> = input
        .instances
        .iter()
        .filter(|i| !i.being_deleted && !i.phase.is_failed())
        .collect();
    let current: Vec<&InstanceView> = live
        .iter()
        .copied()
        .filter(|i| i.fingerprint == input.fingerprint)
        .collect();
    let stale: Vec<&InstanceView> = live
        .iter()
        .copied()
        .filter(|i| i.fingerprint != input.fingerprint)
        .collect();

    if rollout.state.is_stable() {
        if input.fingerprint != rollout.stable_fingerprint {
            rollout.state = RolloutState::RollingOut;
            rollout.target_fingerprint = input.fingerprint.clone();
            rollout.started_at = Some(input.now);
            rollout.reason = None;
        }
    } else if rollout.target_fingerprint != input.fingerprint {
        // template changed again mid-rollout, retarget and restart the clock
        rollout.target_fingerprint = input.fingerprint.clone();
        rollout.started_at = Some(input.now);
    }

    // a replacement turning ready is progress, it pushes the deadline out
    if !rollout.state.is_stable() {
        let newest_ready = current.iter().filter_map(|i| i.ready_at).max();
        if let (Some(ready_at), Some(marker)) = (newest_ready, rollout.started_at) {
            if ready_at > marker {
                rollout.started_at = Some(ready_at);
            }
        }
    }

    // rollout finished once only target-fingerprint instances remain and
    // every one of them is available
    if !rollout.state.is_stable()
        && stale.is_empty()
        && current.len() == desired
        && current.iter().all(|i| i.available)
    {
        rollout.settle(input.fingerprint.clone(), input.template.clone());
    }

    // a rollout making no progress within the deadline falls back to the
    // settled template; the reversed direction reuses this same machinery
    if rollout.state == RolloutState::RollingOut {
        if let Some(marker) = rollout.started_at {
            let deadline = input.strategy.progress_deadline_secs as i64;
            if input.now.signed_duration_since(marker).num_seconds() > deadline {
                if let Some(stable) = rollout.stable_template.clone() {
                    rollout.state = RolloutState::RollingBack;
                    rollout.reason = Some(REASON_PROGRESS_DEADLINE.to_owned());
                    rollout.target_fingerprint = rollout.stable_fingerprint.clone();
                    rollout.started_at = Some(input.now);
                    return Plan {
                        create: 0,
                        terminate,
                        rollout,
                        revert_template: Some(stable),
                    };
                }
            }
        }
    }

    let max_surge = input.strategy.max_surge as usize;
    let max_unavailable = input.strategy.max_unavailable as usize;
    let total = live.len();
    let available_total = live.iter().filter(|i| i.available).count();

    // create replacements and missing replicas up to the surge bound
    let mut create = 0usize;
    if current.len() < desired {
        let missing = desired - current.len();
        let room = (desired + max_surge).saturating_sub(total);
        create = missing.min(room);
    }

    // plain scale down of surplus target-fingerprint instances
    if current.len() > desired {
        let surplus = current.len() - desired;
        terminate.extend(select_victims(&current, surplus));
    }

    // drain stale instances while holding the availability floor
    if !stale.is_empty() {
        let floor = desired.saturating_sub(max_unavailable);
        let mut allowance = available_total.saturating_sub(floor);

        let mut candidates = stale.clone();
        sort_worst_first(&mut candidates);
        for victim in candidates {
            if victim.available {
                if allowance == 0 {
                    continue;
                }
                allowance -= 1;
            }
            terminate.push(victim.key.clone());
        }
    }

    Plan {
        create: create as ReplicaCount,
        terminate,
        rollout,
        revert_template: None,
    }
}

fn phase_rank(phase: InstancePhase) -> u8 {
    match phase {
        InstancePhase::Failed => 0,
        InstancePhase::Terminating => 1,
        InstancePhase::Pending => 2,
        InstancePhase::Running => 3,
        InstancePhase::Ready => 4,
    }
}

fn sort_worst_first(candidates: &mut [&InstanceView]) {
    candidates.sort_by(|a, b| {
        phase_rank(a.phase)
            .cmp(&phase_rank(b.phase))
            .then(a.created_at.cmp(&b.created_at))
    });
}

/// pick `count` victims, least useful first, oldest breaking ties
fn select_victims(candidates: &[&InstanceView], count: usize) -> Vec<ObjectKey> {
    let mut sorted = candidates.to_vec();
    sort_worst_first(&mut sorted);
    sorted
        .into_iter()
        .take(count)
        .map(|i| i.key.clone())
        .collect()
}
