//! Concurrent registry of recently created resources.
//!
//! The [`ResourceStore`] mediates between a producer that creates a named
//! resource and the consumers that retrieve it. A retrieval ([`get`]) also
//! removes the resource from the store. A background reaper loops through
//! the registry on a fixed interval and marks populated entries stale, or
//! removes them if they are already stale, so an unclaimed resource lives
//! between one and two intervals before its cleaner runs.
//!
//! Consumers that arrive before the producer has finished can request a
//! watcher ([`watcher_for`]); every watcher is notified when the resource
//! is put. This lets a server absorb client retries of a slow creation
//! request: the retry parks on the watcher instead of kicking off a second
//! creation.
//!
//! # Architecture
//!
//! ```text
//! ResourceStore (Clone, Arc-backed)
//!     └── entries: Mutex<HashMap<String, ResourceEntry>>
//!
//! ResourceEntry:
//!     ├── resource: Option<Box<dyn StoredResource>>   // None = placeholder
//!     ├── cleaner:  Option<Arc<ResourceCleaner>>
//!     ├── watchers: Vec<oneshot::Sender<()>>
//!     └── stale:    bool                              // two-phase reaper flag
//! ```
//!
//! A single mutex guards the map and every entry field. Watcher
//! notifications are sent while the lock is held; that is safe because a
//! one-shot send never blocks. The reaper detaches doomed entries from the
//! map first and runs their cleaners only after releasing the lock.
//!
//! [`get`]: ResourceStore::get
//! [`watcher_for`]: ResourceStore::watcher_for

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, info, trace};

use crate::cleaner::ResourceCleaner;
use crate::config::StoreConfig;

/// One-shot notification handed to a waiter by
/// [`ResourceStore::watcher_for`].
///
/// Resolves at most once, when the resource is put. The waiter must then
/// call [`ResourceStore::get`] to claim the resource; the notification
/// itself carries no data. Dropping the watcher is a safe way to stop
/// waiting.
pub type Watcher = oneshot::Receiver<()>;

/// Errors returned by the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// A resource with this name is already registered and populated.
    ///
    /// The existing entry is unchanged and the rejected cleaner is not
    /// run; tearing down the rejected resource is the caller's job.
    #[error("entry already exists in store: {name}")]
    DuplicateName {
        /// Name the caller tried to register a second time.
        name: String,
    },
}

/// Capabilities the store needs from a resource.
///
/// Both methods are invoked while the store lock is held; neither may call
/// back into the store or block.
pub trait StoredResource: Send {
    /// Returns the stable identifier handed back to the consumer.
    fn id(&self) -> String;

    /// Signals that the resource is now live and may be listed and
    /// operated upon. Called exactly once, by the [`ResourceStore::get`]
    /// that claims the resource.
    fn mark_created(&mut self);
}

/// One slot in the registry.
///
/// An entry created by a watcher before the producer finished is a
/// placeholder: it has watchers but no resource and no cleaner. `put`
/// populates it in place.
struct ResourceEntry {
    name: String,
    resource: Option<Box<dyn StoredResource>>,
    cleaner: Option<Arc<ResourceCleaner>>,
    watchers: Vec<oneshot::Sender<()>>,
    stale: bool,
}

impl ResourceEntry {
    fn placeholder(name: String) -> Self {
        Self {
            name,
            resource: None,
            cleaner: None,
            watchers: Vec::new(),
            stale: false,
        }
    }

    fn populated(
        name: String,
        resource: Box<dyn StoredResource>,
        cleaner: Arc<ResourceCleaner>,
    ) -> Self {
        Self {
            name,
            resource: Some(resource),
            cleaner: Some(cleaner),
            watchers: Vec::new(),
            stale: false,
        }
    }

    fn is_populated(&self) -> bool {
        self.resource.is_some()
    }
}

struct StoreInner {
    entries: Mutex<HashMap<String, ResourceEntry>>,
    closed: AtomicBool,
    shutdown: Arc<Notify>,
}

/// Registry of recently created resources.
///
/// Cheap to clone; all clones view the same registry. Constructing a store
/// spawns its reaper task and therefore requires a running tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// let store = ResourceStore::new();
///
/// // Producer, once creation finishes:
/// store.put(name, Box::new(resource), cleaner).await?;
///
/// // Retry handler:
/// if let Some(id) = store.get(name).await {
///     return respond(id);
/// }
/// let watcher = store.watcher_for(name).await;
/// watcher.await.ok();
/// let id = store.get(name).await;
/// ```
#[derive(Clone)]
pub struct ResourceStore {
    inner: Arc<StoreInner>,
}

impl ResourceStore {
    /// Creates a store with the default reap interval and starts its
    /// reaper.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with the given configuration and starts its reaper.
    ///
    /// Short reap intervals are intended for tests; most embedders should
    /// use [`ResourceStore::new`].
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let inner = Arc::new(StoreInner {
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        });

        tokio::spawn(reap_loop(
            Arc::downgrade(&inner),
            Arc::clone(&inner.shutdown),
            config.reap_interval,
        ));

        Self { inner }
    }

    /// Registers a finished resource under `name`.
    ///
    /// If a placeholder exists for `name` (watchers arrived first), it is
    /// populated in place and every attached watcher is notified before
    /// this call returns. The store holds the cleaner until the resource
    /// is either claimed by [`get`](ResourceStore::get), in which case the
    /// cleaner never runs, or discarded by the reaper, which runs it once.
    ///
    /// The producer should keep its own clone of the `cleaner` so it can
    /// tear down on its remaining failure paths; the steps run at most
    /// once regardless of which side triggers them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateName`] if a populated entry already
    /// exists for `name`. The existing entry is left untouched and the
    /// rejected cleaner is not run.
    pub async fn put(
        &self,
        name: impl Into<String>,
        resource: Box<dyn StoredResource>,
        cleaner: Arc<ResourceCleaner>,
    ) -> Result<(), StoreError> {
        let name = name.into();
        let mut entries = self.inner.entries.lock().await;

        match entries.entry(name) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_populated() {
                    return Err(StoreError::DuplicateName {
                        name: occupied.key().clone(),
                    });
                }

                let entry = occupied.get_mut();
                entry.resource = Some(resource);
                entry.cleaner = Some(cleaner);

                // A one-shot send never blocks; waiters that gave up and
                // dropped their receiver are ignored.
                let watchers = entry.watchers.len();
                for watcher in entry.watchers.drain(..) {
                    let _ = watcher.send(());
                }
                debug!(name = %entry.name, watchers, "populated pending resource");
            }
            MapEntry::Vacant(vacant) => {
                let entry =
                    ResourceEntry::populated(vacant.key().clone(), resource, cleaner);
                debug!(name = %entry.name, "stored resource");
                vacant.insert(entry);
            }
        }

        Ok(())
    }

    /// Claims the resource registered under `name`.
    ///
    /// Returns `None` if no entry exists or the entry is still a
    /// placeholder (creation in flight). Otherwise the entry is removed
    /// from the store, the resource is marked created, and its identifier
    /// is returned. The cleaner of a claimed resource never runs;
    /// ownership of teardown transfers to the caller.
    pub async fn get(&self, name: &str) -> Option<String> {
        let mut entries = self.inner.entries.lock().await;

        // An entry may exist for watchers only; that is not a resource
        // anyone can claim yet.
        if !entries.get(name).is_some_and(ResourceEntry::is_populated) {
            return None;
        }

        let mut entry = entries.remove(name)?;
        let resource = entry.resource.as_mut()?;
        resource.mark_created();

        trace!(name = %entry.name, "resource claimed");
        Some(resource.id())
    }

    /// Hands out a watcher for `name`.
    ///
    /// If no entry exists yet, a placeholder is inserted to carry the
    /// watcher until the producer puts the resource. The returned channel
    /// resolves when the resource is put; the waiter must then call
    /// [`get`](ResourceStore::get) to claim it. Watchers attached after
    /// the resource was already put are never notified; such callers
    /// should try [`get`](ResourceStore::get) first.
    pub async fn watcher_for(&self, name: impl Into<String>) -> Watcher {
        let (sender, receiver) = oneshot::channel();
        let mut entries = self.inner.entries.lock().await;

        let entry = entries
            .entry(name.into())
            .or_insert_with_key(|name| ResourceEntry::placeholder(name.clone()));
        entry.watchers.push(sender);

        trace!(name = %entry.name, watchers = entry.watchers.len(), "watcher attached");
        receiver
    }

    /// Shuts down the reaper. Idempotent.
    ///
    /// Entries still in the store are kept but their cleaners will no
    /// longer fire; the store stays usable for `put`, `get` and
    /// `watcher_for`.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing resource store");
        self.inner.shutdown.notify_one();
    }

    /// Returns the number of entries currently tracked, placeholders
    /// included.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    /// Returns `true` if no entries are tracked.
    pub async fn is_empty(&self) -> bool {
        self.inner.entries.lock().await.is_empty()
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Background collection of entries nobody claimed.
///
/// Each pass marks populated entries stale and removes the ones already
/// marked, so an entry transitions fresh, then stale, then removed across
/// two passes and never inside one. Placeholders are skipped entirely: a
/// placeholder has no cleaner to run, and the producer may still be in
/// flight.
///
/// The task holds only a weak reference to the store between passes; it
/// exits when the store is closed or every handle has been dropped.
async fn reap_loop(inner: Weak<StoreInner>, shutdown: Arc<Notify>, interval: Duration) {
    loop {
        tokio::select! {
            () = shutdown.notified() => return,
            () = tokio::time::sleep(interval) => {}
        }

        let Some(store) = inner.upgrade() else { return };

        let reaped = {
            let mut entries = store.entries.lock().await;

            let mut doomed = Vec::new();
            for (name, entry) in entries.iter_mut() {
                if !entry.is_populated() {
                    continue;
                }
                if entry.stale {
                    doomed.push(name.clone());
                }
                entry.stale = true;
            }

            let mut reaped = Vec::with_capacity(doomed.len());
            for name in doomed {
                if let Some(entry) = entries.remove(&name) {
                    reaped.push(entry);
                }
            }
            reaped
        };
        drop(store);

        // Cleaners may be slow or take their own locks; never run them
        // under the store lock.
        for entry in reaped {
            info!(name = %entry.name, "cleaning up stale resource");
            if let Some(cleaner) = entry.cleaner {
                cleaner.cleanup();
            }
        }
    }
}
