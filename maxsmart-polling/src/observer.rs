use crate::{ObserverError, PollSnapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Receives every snapshot the polling loop produces
///
/// Observers run sequentially on the polling task, so they should return
/// quickly. Errors and panics are logged and never stop the loop.
pub trait PollObserver: Send + Sync {
    fn on_poll(&self, snapshot: &PollSnapshot) -> Result<(), ObserverError>;
}

impl<F> PollObserver for F
where
    F: Fn(&PollSnapshot) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_poll(&self, snapshot: &PollSnapshot) -> Result<(), ObserverError> {
        self(snapshot)
    }
}

/// Observers keyed by caller chosen name
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: RwLock<BTreeMap<String, Arc<dyn PollObserver>>>,
}

impl ObserverRegistry {
    /// Insert or replace; returns true when a previous observer was replaced
    pub fn register(&self, name: String, observer: Arc<dyn PollObserver>) -> bool {
        self.observers.write().insert(name, observer).is_some()
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.observers.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.observers.read().keys().cloned().collect()
    }

    /// Invoke every observer; returns how many failed
    pub fn notify(&self, snapshot: &PollSnapshot) -> usize {
        // Snapshot the map so observers may (un)register without deadlocking
        let observers: Vec<(String, Arc<dyn PollObserver>)> = self
            .observers
            .read()
            .iter()
            .map(|(name, observer)| (name.clone(), Arc::clone(observer)))
            .collect();

        let mut failures = 0;
        for (name, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_poll(snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(observer = %name, error = %e, "poll observer failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(observer = %name, "poll observer panicked");
                }
            }
        }
        failures
    }
}
