//!
//! # Local YAML persistence
//!
//! Mirrors one kind's store to a directory of YAML documents, one per
//! object, named `{namespace}.{name}.yaml`. Each document is wrapped in an
//! api-versioned envelope carrying the object's uid and generation, so a
//! restart rehydrates the store with its last-committed generations intact.
//! Writes go through a temp file and an atomic rename; a crash never leaves
//! a torn document behind.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use flotilla_state_model::core::{MetadataContext, Spec};
use flotilla_state_model::store::{ChangeListener, LocalStore, MetadataStoreObject};
use flotilla_types::event::StickyEvent;

use super::ObjMeta;

/// directory of on-disk documents for a single kind
#[derive(Debug)]
pub struct LocalStorage<S> {
    path: PathBuf,
    _spec: PhantomData<S>,
}

impl<S> LocalStorage<S>
where
    S: Spec + Serialize + DeserializeOwned,
    S::IndexKey: Serialize + DeserializeOwned,
    S::Status: Serialize + DeserializeOwned,
{
    /// open (and create if needed) the kind's directory under `base`
    pub fn open(base: impl AsRef<Path>) -> Result<Self> {
        let path = base.as_ref().join(S::LABEL.to_lowercase());
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating spec dir {}", path.display()))?;
        Ok(Self {
            path,
            _spec: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every document in the directory. Unreadable documents are
    /// skipped with a warning rather than poisoning the whole load; an
    /// unreadable directory is fatal.
    pub fn load_all(&self) -> Result<Vec<MetadataStoreObject<S, ObjMeta>>> {
        let mut loaded = Vec::new();
        for entry in std::fs::read_dir(&self.path)
            .with_context(|| format!("reading spec dir {}", self.path.display()))?
        {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            match Self::load_one(&path) {
                Ok(obj) => {
                    debug!("loaded {} {}", S::LABEL, obj.key().to_string());
                    loaded.push(obj);
                }
                Err(err) => {
                    warn!("skipped spec file {}: {err:#}", path.display());
                }
            }
        }
        Ok(loaded)
    }

    fn load_one(path: &Path) -> Result<MetadataStoreObject<S, ObjMeta>> {
        let file = std::fs::File::open(path)?;
        let envelope: VersionedEnvelope<S> = serde_yaml::from_reader(file)?;
        Ok(envelope.into_obj())
    }

    /// flush one object, replacing any previous document atomically
    pub fn save(&self, obj: &MetadataStoreObject<S, ObjMeta>) -> Result<()> {
        let target = self.spec_file(obj.key());
        let staging = target.with_extension("yaml.tmp");

        let file = std::fs::File::create(&staging)
            .with_context(|| format!("creating {}", staging.display()))?;
        serde_yaml::to_writer(file, &VersionedEnvelope::latest(obj))?;
        std::fs::rename(&staging, &target)
            .with_context(|| format!("replacing {}", target.display()))?;
        Ok(())
    }

    /// drop an object's document; removing twice is fine
    pub fn remove(&self, key: &S::IndexKey) -> Result<()> {
        let target = self.spec_file(key);
        match std::fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", target.display())),
        }
    }

    // `{namespace}/{name}` keys map onto `{namespace}.{name}.yaml`
    fn spec_file(&self, key: &S::IndexKey) -> PathBuf {
        self.path
            .join(format!("{}.yaml", key.to_string().replace('/', ".")))
    }
}

/// On-disk document, tagged with its envelope version so future layouts can
/// coexist in one directory.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "apiVersion")]
#[serde(bound(
    serialize = "S: Serialize, S::IndexKey: Serialize, S::Status: Serialize",
    deserialize = "S: DeserializeOwned, S::IndexKey: DeserializeOwned, S::Status: DeserializeOwned"
))]
pub enum VersionedEnvelope<S>
where
    S: Spec,
{
    #[serde(rename = "v1")]
    V1(EnvelopeV1<S>),
}

impl<S> VersionedEnvelope<S>
where
    S: Spec,
{
    fn latest(obj: &MetadataStoreObject<S, ObjMeta>) -> Self {
        Self::V1(EnvelopeV1::from_obj(obj))
    }

    fn into_obj(self) -> MetadataStoreObject<S, ObjMeta> {
        match self {
            Self::V1(v1) => v1.into_obj(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "S: Serialize, S::IndexKey: Serialize, S::Status: Serialize",
    deserialize = "S: DeserializeOwned, S::IndexKey: DeserializeOwned, S::Status: DeserializeOwned"
))]
pub struct EnvelopeV1<S>
where
    S: Spec,
{
    #[serde(flatten)]
    meta: ObjMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<ObjMeta>,
    key: S::IndexKey,
    spec: S,
    status: S::Status,
}

impl<S> EnvelopeV1<S>
where
    S: Spec,
{
    fn from_obj(obj: &MetadataStoreObject<S, ObjMeta>) -> Self {
        Self {
            meta: obj.ctx().item().clone(),
            owner: obj.ctx().owner().cloned(),
            key: obj.key_owned(),
            spec: obj.spec.clone(),
            status: obj.status.clone(),
        }
    }

    fn into_obj(self) -> MetadataStoreObject<S, ObjMeta> {
        let mut obj = MetadataStoreObject::new(self.key, self.spec, self.status);
        obj.set_ctx(MetadataContext::new(self.meta, self.owner));
        obj
    }
}

/// Mirrors every committed change of one kind's store to disk. Driven by a
/// change listener, so the first drain after startup re-flushes the full
/// store; re-writing an unchanged document is harmless.
pub struct PersistenceController<S>
where
    S: Spec,
{
    storage: LocalStorage<S>,
    store: Arc<LocalStore<S, ObjMeta>>,
    shutdown: Arc<StickyEvent>,
}

impl<S> PersistenceController<S>
where
    S: Spec + PartialEq + Serialize + DeserializeOwned,
    S::IndexKey: Serialize + DeserializeOwned,
    S::Status: PartialEq + Serialize + DeserializeOwned,
{
    pub fn start(
        storage: LocalStorage<S>,
        store: Arc<LocalStore<S, ObjMeta>>,
        shutdown: Arc<StickyEvent>,
    ) {
        let controller = Self {
            storage,
            store,
            shutdown,
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "PersistenceController", fields(kind = S::LABEL))]
    async fn dispatch_loop(self) {
        info!(path = %self.storage.path().display(), "started");

        let mut listener = self.store.change_listener();

        loop {
            self.sync(&mut listener).await;

            tokio::select! {
                _ = listener.listen() => {
                    debug!("store changed");
                },
                _ = self.shutdown.listen() => {
                    debug!("shutdown, terminating");
                    break;
                },
            }
        }
    }

    async fn sync(&self, listener: &mut ChangeListener<S, ObjMeta>) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        if changes.is_empty() {
            return;
        }

        let (updates, deletes) = changes.parts();
        debug!(
            updates = updates.len(),
            deletes = deletes.len(),
            "flushing changes"
        );

        // one bad object must not stall the rest of the drain
        for obj in updates {
            if let Err(err) = self.storage.save(&obj) {
                error!("failed to flush {}: {err:#}", obj.key().to_string());
            }
        }
        for obj in deletes {
            if let Err(err) = self.storage.remove(obj.key()) {
                error!(
                    "failed to remove document {}: {err:#}",
                    obj.key().to_string()
                );
            }
        }
    }
}
