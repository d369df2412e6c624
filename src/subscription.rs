//! Cancellation handles returned by [`Watch::subscribe`](crate::Watch::subscribe).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::filter::{FilterId, FilterRegistry};
use crate::path::PathKey;

/// Filters registered by one call, grouped by path.
#[derive(Default)]
pub(crate) struct Registrations {
    entries: BTreeMap<PathKey, (Arc<FilterRegistry>, Vec<FilterId>)>,
}

impl Registrations {
    pub(crate) fn push(&mut self, path: PathKey, registry: &Arc<FilterRegistry>, id: FilterId) {
        self.entries
            .entry(path)
            .or_insert_with(|| (Arc::clone(registry), Vec::new()))
            .1
            .push(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(|(_, ids)| ids.len()).sum()
    }

    /// Removes every registration, one write lock per path.
    pub(crate) fn remove(self) -> usize {
        self.entries
            .into_iter()
            .map(|(path, (registry, ids))| {
                let removed = registry.remove_all(&ids);
                debug!(namespace = %path, removed, "removed filters");
                removed
            })
            .sum()
    }
}

/// Handle to the filters registered by one `subscribe` call.
///
/// Dropping the handle leaves the filters registered; call
/// [`cancel`](Self::cancel) to remove them.
pub struct Subscription {
    registrations: Mutex<Option<Registrations>>,
    len: usize,
}

impl Subscription {
    pub(crate) fn new(registrations: Registrations) -> Self {
        Self {
            len: registrations.len(),
            registrations: Mutex::new(Some(registrations)),
        }
    }

    /// Removes every filter this subscription registered.
    ///
    /// Returns `true` the first time; later calls are no-ops returning `false`.
    pub fn cancel(&self) -> bool {
        // Take under the mutex, remove outside it.
        let registrations = self.registrations.lock().take();
        match registrations {
            Some(registrations) => {
                registrations.remove();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.registrations.lock().is_none()
    }

    /// Number of filters registered by the call.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("len", &self.len)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
