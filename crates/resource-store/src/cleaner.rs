//! Teardown callbacks for stored resources.
//!
//! A [`ResourceCleaner`] collects the cleanup steps a producer accumulates
//! while creating a resource (remove files, release locks, notify
//! subsystems). Steps run in reverse-insertion order, mirroring the order
//! the underlying resources were acquired.
//!
//! The cleaner is shared between the producer and the store: the producer
//! keeps its own handle so it can tear down after a failed or rejected
//! creation, while the store runs the same cleaner if the resource is
//! never claimed. Whichever side runs first wins; the steps execute at
//! most once.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct CleanupStep {
    description: &'static str,
    run: CleanupFn,
}

/// Ordered stack of cleanup callbacks attached to a stored resource.
///
/// Callbacks must be idempotent and must not call back into the store.
/// Failures are logged at warn level and swallowed; a failing step never
/// prevents the remaining steps from running.
#[derive(Default)]
pub struct ResourceCleaner {
    steps: Mutex<Vec<CleanupStep>>,
}

impl ResourceCleaner {
    /// Creates an empty cleaner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup step.
    ///
    /// The description is carried into the log line if the step fails.
    /// Steps run in reverse-insertion order: the last step added is the
    /// first one executed.
    pub fn add<F>(&self, description: &'static str, step: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lock_steps().push(CleanupStep {
            description,
            run: Box::new(step),
        });
    }

    /// Returns the number of steps that have not run yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_steps().len()
    }

    /// Returns `true` if no steps are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_steps().is_empty()
    }

    /// Runs all pending steps, last-registered first.
    ///
    /// Each failure is logged and swallowed. Calling `cleanup` again is a
    /// no-op: the steps are drained before they run.
    pub fn cleanup(&self) {
        let steps = std::mem::take(&mut *self.lock_steps());
        if steps.is_empty() {
            return;
        }

        debug!(steps = steps.len(), "running resource cleanup");
        for step in steps.into_iter().rev() {
            if let Err(error) = (step.run)() {
                warn!(step = step.description, %error, "cleanup step failed");
            }
        }
    }

    fn lock_steps(&self) -> MutexGuard<'_, Vec<CleanupStep>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResourceCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCleaner")
            .field("pending_steps", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_steps_run_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let cleaner = ResourceCleaner::new();

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            cleaner.add(label, move || {
                order.lock().unwrap().push(label);
                Ok(())
            });
        }

        cleaner.cleanup();

        let order = order.lock().unwrap();
        assert_eq!(*order, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_failing_step_does_not_stop_the_rest() {
        let ran = Arc::new(AtomicUsize::new(0));

        let cleaner = ResourceCleaner::new();
        let counter = Arc::clone(&ran);
        cleaner.add("runs last", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        cleaner.add("fails", || anyhow::bail!("disk on fire"));

        cleaner.cleanup();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_runs_at_most_once() {
        let ran = Arc::new(AtomicUsize::new(0));

        let cleaner = ResourceCleaner::new();
        let counter = Arc::clone(&ran);
        cleaner.add("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        cleaner.cleanup();
        cleaner.cleanup();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_len_and_is_empty() {
        let cleaner = ResourceCleaner::new();
        assert!(cleaner.is_empty());

        cleaner.add("noop", || Ok(()));
        assert_eq!(cleaner.len(), 1);
        assert!(!cleaner.is_empty());

        cleaner.cleanup();
        assert!(cleaner.is_empty());
    }

    #[test]
    fn test_debug_does_not_render_callbacks() {
        let cleaner = ResourceCleaner::new();
        cleaner.add("noop", || Ok(()));

        let debug = format!("{cleaner:?}");
        assert!(debug.contains("pending_steps: 1"));
    }
}
