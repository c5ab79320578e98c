//! Request gate: resolve a request to a connection handle before any
//! query-executing logic runs.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Rejection;
use crate::handle::ConnectionHandle;
use crate::store::ConnectionStore;

/// Outcome of a successful gate check
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Allow-listed path, no handle required
    Skipped,
    /// Request may proceed with this handle
    Admitted(Arc<ConnectionHandle>),
}

#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn ConnectionStore>,
    allowed: HashSet<String>,
}

impl Gate {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            store,
            allowed: HashSet::new(),
        }
    }

    /// Let `path` through without a connection.
    pub fn allow(mut self, path: impl Into<String>) -> Self {
        self.allowed.insert(path.into());
        self
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        self.allowed.contains(path)
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    pub fn check(&self, path: &str, session: Option<&str>) -> Result<GateDecision, Rejection> {
        if self.is_allowed(path) {
            return Ok(GateDecision::Skipped);
        }

        self.store.lookup(session).map(GateDecision::Admitted)
    }
}
