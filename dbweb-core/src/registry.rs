//! Session registry: session id -> connection handle
//!
//! One mutex guards the map, so every operation is linearizable with
//! respect to the others. The lock is never held across an `.await`:
//! removal takes the entry out under the lock and closes it afterwards,
//! which keeps the decision to close and the map mutation atomic while
//! the close I/O runs unlocked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::handle::ConnectionHandle;
use crate::lock;
use crate::metrics::MetricsSink;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<ConnectionHandle>>>,
    metrics: Arc<dyn MetricsSink>,
}

impl SessionRegistry {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Insert or overwrite the handle for `id`.
    ///
    /// Returns the displaced handle, if any. The caller owns it and must
    /// close it; the registry no longer references it.
    pub fn add(
        &self,
        id: &str,
        handle: Arc<ConnectionHandle>,
    ) -> Result<Option<Arc<ConnectionHandle>>, RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let mut sessions = lock(&self.sessions);
        let previous = sessions.insert(id.to_string(), handle);
        self.metrics.set_session_count(sessions.len());

        Ok(previous)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Remove and close the handle for `id`. Returns whether an entry existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.remove_if(id, |_| true).await
    }

    /// Remove and close the handle for `id` only if `predicate` holds for the
    /// entry present at removal time.
    pub async fn remove_if<F>(&self, id: &str, predicate: F) -> bool
    where
        F: FnOnce(&ConnectionHandle) -> bool,
    {
        let removed = {
            let mut sessions = lock(&self.sessions);
            let matched = sessions.get(id).is_some_and(|handle| predicate(handle));
            let taken = if matched { sessions.remove(id) } else { None };
            self.metrics.set_session_count(sessions.len());
            taken
        };

        match removed {
            Some(handle) => {
                close_logged(id, &handle).await;
                true
            }
            None => false,
        }
    }

    /// Session ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Point-in-time copy of the mapping.
    pub fn sessions(&self) -> HashMap<String, Arc<ConnectionHandle>> {
        lock(&self.sessions).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    /// Drain the registry, closing every handle. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<(String, Arc<ConnectionHandle>)> = {
            let mut sessions = lock(&self.sessions);
            let drained = sessions.drain().collect();
            self.metrics.set_session_count(0);
            drained
        };

        for (id, handle) in &drained {
            close_logged(id, handle).await;
        }

        drained.len()
    }
}

async fn close_logged(id: &str, handle: &ConnectionHandle) {
    match handle.close().await {
        Ok(()) => debug!(session = %id, "closed session connection"),
        Err(err) => warn!(session = %id, error = %err, "failed to close session connection"),
    }
}
