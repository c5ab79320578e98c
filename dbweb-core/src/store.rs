//! One interface over the two connection stores
//!
//! `SingleConnection` holds at most one process-wide handle and ignores
//! session ids; `SessionRegistry` holds one handle per session id. The gate
//! and the HTTP routes work against `ConnectionStore` and never branch on
//! which one is configured.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{RegistryError, Rejection};
use crate::handle::ConnectionHandle;
use crate::registry::SessionRegistry;
use crate::single::SingleConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Single,
    Sessions,
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    fn mode(&self) -> StoreMode;

    /// Resolve the handle for a request.
    fn lookup(&self, session: Option<&str>) -> Result<Arc<ConnectionHandle>, Rejection>;

    /// Install a handle, closing whatever it displaces.
    async fn attach(
        &self,
        session: Option<&str>,
        handle: Arc<ConnectionHandle>,
    ) -> Result<(), Rejection>;

    /// Remove and close the handle. Returns whether one was present.
    async fn detach(&self, session: Option<&str>) -> Result<bool, Rejection>;

    /// Number of live handles
    fn count(&self) -> usize;
}

fn session_id(session: Option<&str>) -> Result<&str, Rejection> {
    session.filter(|id| !id.is_empty()).ok_or(Rejection::SessionRequired)
}

pub(crate) async fn close_displaced(previous: Option<Arc<ConnectionHandle>>) {
    if let Some(previous) = previous {
        if let Err(err) = previous.close().await {
            warn!(error = %err, "failed to close replaced connection");
        }
    }
}

#[async_trait]
impl ConnectionStore for SessionRegistry {
    fn mode(&self) -> StoreMode {
        StoreMode::Sessions
    }

    fn lookup(&self, session: Option<&str>) -> Result<Arc<ConnectionHandle>, Rejection> {
        let id = session_id(session)?;
        self.get(id).ok_or(Rejection::NotConnected)
    }

    async fn attach(
        &self,
        session: Option<&str>,
        handle: Arc<ConnectionHandle>,
    ) -> Result<(), Rejection> {
        let id = session_id(session)?;
        let previous = self.add(id, handle).map_err(|err| match err {
            RegistryError::EmptyId => Rejection::SessionRequired,
        })?;
        close_displaced(previous).await;
        Ok(())
    }

    async fn detach(&self, session: Option<&str>) -> Result<bool, Rejection> {
        let id = session_id(session)?;
        Ok(self.remove(id).await)
    }

    fn count(&self) -> usize {
        self.len()
    }
}

#[async_trait]
impl ConnectionStore for SingleConnection {
    fn mode(&self) -> StoreMode {
        StoreMode::Single
    }

    fn lookup(&self, _session: Option<&str>) -> Result<Arc<ConnectionHandle>, Rejection> {
        self.get().ok_or(Rejection::NotConnected)
    }

    async fn attach(
        &self,
        _session: Option<&str>,
        handle: Arc<ConnectionHandle>,
    ) -> Result<(), Rejection> {
        close_displaced(self.set(handle)).await;
        Ok(())
    }

    async fn detach(&self, _session: Option<&str>) -> Result<bool, Rejection> {
        Ok(self.disconnect().await)
    }

    fn count(&self) -> usize {
        usize::from(self.get().is_some())
    }
}
