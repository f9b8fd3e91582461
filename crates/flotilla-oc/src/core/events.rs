//!
//! # Change event feed
//!
//! Committed store changes surface here as `ChangeEvent`s. A relay task per
//! kind drains that kind's change listener and publishes into the log, which
//! keeps a bounded history for the admin event listing and fans events out
//! to live subscribers as an async stream.
//!
//! The feed is observational. Controllers never consume it; they hold their
//! own change listeners and re-read current store state, so a lagging
//! subscriber here can only miss intermediate states, never corrupt
//! reconciliation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_channel::{Receiver, Sender, bounded};
use async_lock::Mutex;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, trace};

use flotilla_metadata::core::Spec;
use flotilla_metadata::extended::{ObjectType, SpecExt};
use flotilla_metadata::key::ObjectKey;
use flotilla_types::event::StickyEvent;

use crate::dispatcher::store::StoreContext;

/// per-subscriber buffer; a subscriber that lags past this loses oldest events
const SUBSCRIBER_BUFFER: usize = 128;

pub type SharedEventLog = Arc<EventLog>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// one committed change on one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub object_type: ObjectType,
    pub change: ChangeKind,
    pub key: ObjectKey,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(object_type: ObjectType, change: ChangeKind, key: ObjectKey) -> Self {
        Self {
            object_type,
            change,
            key,
            at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    filter: Option<ObjectType>,
    sender: Sender<ChangeEvent>,
}

#[derive(Debug, Default)]
struct EventLogInner {
    history: VecDeque<ChangeEvent>,
    subscribers: Vec<Subscriber>,
}

/// Bounded history of committed changes plus live fan-out.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    inner: Mutex<EventLogInner>,
}

impl EventLog {
    pub fn shared(capacity: usize) -> SharedEventLog {
        Arc::new(Self {
            capacity,
            inner: Mutex::new(EventLogInner::default()),
        })
    }

    /// stream of change events, optionally restricted to one kind
    pub async fn subscribe(&self, filter: Option<ObjectType>) -> Receiver<ChangeEvent> {
        let (sender, receiver) = bounded(SUBSCRIBER_BUFFER);
        self.inner
            .lock()
            .await
            .subscribers
            .push(Subscriber { filter, sender });
        receiver
    }

    /// recorded events for a namespace, newest last
    pub async fn list(
        &self,
        namespace: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<ChangeEvent> {
        let inner = self.inner.lock().await;
        inner
            .history
            .iter()
            .filter(|event| namespace.is_none_or(|ns| event.key.namespace() == ns))
            .filter(|event| since.is_none_or(|at| event.at > at))
            .cloned()
            .collect()
    }

    pub async fn publish(&self, event: ChangeEvent) {
        let mut inner = self.inner.lock().await;

        inner.history.push_back(event.clone());
        while inner.history.len() > self.capacity {
            inner.history.pop_front();
        }

        inner.subscribers.retain(|subscriber| {
            if subscriber
                .filter
                .is_some_and(|wanted| wanted != event.object_type)
            {
                return true;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(async_channel::TrySendError::Full(_)) => {
                    // lagging subscriber, it will re-read current state
                    trace!(%event.key, "subscriber buffer full, event dropped");
                    true
                }
                Err(async_channel::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// Relay task turning one kind's store changes into published events.
///
/// The store delta carries no created/updated distinction, so the relay
/// tracks the keys it has seen; final removal of a key surfaces as deleted.
pub struct EventRelay<S>
where
    S: Spec + SpecExt,
{
    ctx: StoreContext<S>,
    log: SharedEventLog,
    shutdown: Arc<StickyEvent>,
}

impl<S> EventRelay<S>
where
    S: Spec<IndexKey = ObjectKey> + SpecExt,
    S::Status: Send + Sync,
{
    pub fn start(ctx: StoreContext<S>, log: SharedEventLog, shutdown: Arc<StickyEvent>) {
        let relay = Self { ctx, log, shutdown };

        tokio::spawn(relay.relay_loop());
    }

    #[instrument(skip(self), name = "EventRelay", fields(kind = S::LABEL))]
    async fn relay_loop(mut self) {
        debug!("started");

        let mut listener = self.ctx.change_listener();
        let mut seen: HashSet<ObjectKey> = HashSet::new();

        loop {
            if !listener.has_change() {
                tokio::select! {
                    _ = listener.listen() => {}
                    _ = self.shutdown.listen() => {
                        info!("shutdown");
                        break;
                    }
                }
            }
            if self.shutdown.is_set() {
                info!("shutdown");
                break;
            }

            let changes = listener.sync_changes().await;
            let (updates, deletes) = changes.parts();

            for object in updates {
                let change = if seen.insert(object.key_owned()) {
                    ChangeKind::Created
                } else {
                    ChangeKind::Updated
                };
                self.log
                    .publish(ChangeEvent::new(S::OBJECT_TYPE, change, object.key_owned()))
                    .await;
            }

            for object in deletes {
                seen.remove(object.key());
                self.log
                    .publish(ChangeEvent::new(
                        S::OBJECT_TYPE,
                        ChangeKind::Deleted,
                        object.key_owned(),
                    ))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn event(object_type: ObjectType, change: ChangeKind, ns: &str, name: &str) -> ChangeEvent {
        ChangeEvent::new(object_type, change, ObjectKey::new(ns, name))
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let log = EventLog::shared(3);
        for i in 0..5 {
            log.publish(event(
                ObjectType::Deployment,
                ChangeKind::Updated,
                "default",
                &format!("web-{i}"),
            ))
            .await;
        }

        let events = log.list(None, None).await;
        assert_eq!(events.len(), 3);
        // oldest two were evicted
        assert_eq!(events[0].key.name(), "web-2");
        assert_eq!(events[2].key.name(), "web-4");
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_time() {
        let log = EventLog::shared(16);
        log.publish(event(
            ObjectType::Deployment,
            ChangeKind::Created,
            "prod",
            "web",
        ))
        .await;
        let cutoff = Utc::now();
        log.publish(event(
            ObjectType::Deployment,
            ChangeKind::Updated,
            "prod",
            "web",
        ))
        .await;
        log.publish(event(ObjectType::Service, ChangeKind::Created, "dev", "api")).await;

        let prod = log.list(Some("prod"), None).await;
        assert_eq!(prod.len(), 2);

        let recent = log.list(Some("prod"), Some(cutoff)).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].change, ChangeKind::Updated);
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_kind() {
        let log = EventLog::shared(16);
        let deployments = log.subscribe(Some(ObjectType::Deployment)).await;
        let all = log.subscribe(None).await;

        log.publish(event(ObjectType::Service, ChangeKind::Created, "default", "api")).await;
        log.publish(event(
            ObjectType::Deployment,
            ChangeKind::Created,
            "default",
            "web",
        ))
        .await;

        let got = deployments.recv().await.expect("event");
        assert_eq!(got.object_type, ObjectType::Deployment);
        assert_eq!(all.recv().await.expect("event").object_type, ObjectType::Service);
        assert_eq!(
            all.recv().await.expect("event").object_type,
            ObjectType::Deployment
        );
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let log = EventLog::shared(16);
        let receiver = log.subscribe(None).await;
        drop(receiver);

        log.publish(event(
            ObjectType::Volume,
            ChangeKind::Created,
            "default",
            "data",
        ))
        .await;
        assert_eq!(log.inner.lock().await.subscribers.len(), 0);
    }
}
