//! # resource-store
//!
//! In-process registry that mediates between a producer creating a named
//! resource (possibly slowly) and one or more consumers that want to
//! retrieve or wait for it.
//!
//! RPC servers that create expensive resources suffer a retry pathology:
//! clients time out and re-send a long-running creation request faster than
//! the server can finish it, producing duplicate work and orphaned objects.
//! The store lets the first request's creation proceed while later retries
//! attach as *watchers* that are woken the moment the resource becomes
//! available. Resources that are never claimed are garbage-collected by a
//! background reaper that invokes a caller-supplied cleanup stack.
//!
//! ## Features
//!
//! - **Put / Get**: register a finished resource under a caller-chosen name;
//!   retrieval removes it from the store and marks it created
//! - **Watchers**: one-shot notification channels handed to retries that
//!   arrive while creation is still in flight
//! - **Reaper**: periodic mark-then-sweep collection of resources nobody
//!   claimed, with cleanup callbacks run outside the store lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use resource_store::{ResourceCleaner, ResourceStore, StoredResource};
//!
//! struct Sandbox {
//!     id: String,
//!     created: bool,
//! }
//!
//! impl StoredResource for Sandbox {
//!     fn id(&self) -> String {
//!         self.id.clone()
//!     }
//!
//!     fn mark_created(&mut self) {
//!         self.created = true;
//!     }
//! }
//!
//! # async fn demo() -> Result<(), resource_store::StoreError> {
//! let store = ResourceStore::new();
//!
//! let cleaner = Arc::new(ResourceCleaner::new());
//! cleaner.add("remove scratch directory", || Ok(()));
//!
//! let sandbox = Sandbox { id: "6a7e2f".to_string(), created: false };
//! store.put("sandbox-1", Box::new(sandbox), cleaner).await?;
//!
//! // A retry that raced the creation would have done this instead:
//! // let watcher = store.watcher_for("sandbox-1").await;
//! // watcher.await.ok();
//!
//! assert_eq!(store.get("sandbox-1").await.as_deref(), Some("6a7e2f"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cleaner;
pub mod config;
pub mod store;

pub use cleaner::ResourceCleaner;
pub use config::{DEFAULT_REAP_INTERVAL, StoreConfig};
pub use store::{ResourceStore, StoreError, StoredResource, Watcher};
