//! Single-connection mode: one process-wide handle
//!
//! Owned by the application state and passed down explicitly. The handle
//! is created once at startup (or by a later connect), replaced on
//! reconnect and closed on disconnect or shutdown.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::error::{EstablishError, FailureAction};
use crate::establish::Establisher;
use crate::handle::ConnectionHandle;
use crate::lock;
use crate::params::ConnectionParams;
use crate::store::close_displaced;

/// Lifecycle of the process-wide connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing configured, nothing attempted
    Unconfigured,
    Connecting,
    Connected,
    /// Establishment deferred, or explicitly disconnected
    Disconnected,
}

struct Slot {
    state: LinkState,
    handle: Option<Arc<ConnectionHandle>>,
}

pub struct SingleConnection {
    slot: Mutex<Slot>,
}

impl Default for SingleConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleConnection {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: LinkState::Unconfigured,
                handle: None,
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        lock(&self.slot).state
    }

    pub fn get(&self) -> Option<Arc<ConnectionHandle>> {
        lock(&self.slot).handle.clone()
    }

    /// Install a handle, returning the one it replaces (caller closes it).
    pub fn set(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        let mut slot = lock(&self.slot);
        slot.state = LinkState::Connected;
        slot.handle.replace(handle)
    }

    /// Remove the handle without closing it.
    pub fn take(&self) -> Option<Arc<ConnectionHandle>> {
        let mut slot = lock(&self.slot);
        if slot.handle.is_some() {
            slot.state = LinkState::Disconnected;
        }
        slot.handle.take()
    }

    /// Remove and close the handle. Returns whether one was present.
    pub async fn disconnect(&self) -> bool {
        match self.take() {
            Some(handle) => {
                if let Err(err) = handle.close().await {
                    warn!(error = %err, "failed to close connection");
                }
                true
            }
            None => false,
        }
    }

    /// Startup establishment.
    ///
    /// Blank parameters leave the slot `Unconfigured`. A deferred failure
    /// leaves it `Disconnected` and is not an error; a fatal failure is
    /// returned for the caller to abort on.
    pub async fn connect_at_startup(
        &self,
        establisher: &Establisher,
        params: &ConnectionParams,
    ) -> Result<LinkState, EstablishError> {
        if params.is_blank() {
            return Ok(LinkState::Unconfigured);
        }

        lock(&self.slot).state = LinkState::Connecting;
        info!(target_db = %params.redacted(), "connecting to server");

        match establisher.establish(params).await {
            Ok(handle) => {
                close_displaced(self.set(Arc::new(handle))).await;
                Ok(LinkState::Connected)
            }
            Err(err) if err.action == FailureAction::Defer => {
                warn!(error = %err.source, "starting without a database connection");
                lock(&self.slot).state = LinkState::Disconnected;
                Ok(LinkState::Disconnected)
            }
            Err(err) => {
                lock(&self.slot).state = LinkState::Disconnected;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockConnector;
    use crate::error::ConnectError;

    fn refused() -> ConnectError {
        ConnectError::ConnectionRefused("connection refused".into())
    }

    #[tokio::test]
    async fn blank_params_stay_unconfigured() {
        let single = SingleConnection::new();
        let connector = Arc::new(MockConnector::new());
        let state = single
            .connect_at_startup(&Establisher::without_retry(connector.clone()), &ConnectionParams::default())
            .await
            .unwrap();

        assert_eq!(state, LinkState::Unconfigured);
        assert_eq!(single.state(), LinkState::Unconfigured);
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn startup_connects() {
        let single = SingleConnection::new();
        let establisher = Establisher::without_retry(Arc::new(MockConnector::new()));
        let params = ConnectionParams::from_url("postgres://db/app");

        let state = single.connect_at_startup(&establisher, &params).await.unwrap();
        assert_eq!(state, LinkState::Connected);
        assert!(single.get().is_some());
    }

    #[tokio::test]
    async fn implicit_refusal_defers() {
        let single = SingleConnection::new();
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(refused());
        let params = ConnectionParams {
            host: Some("localhost".into()),
            ..ConnectionParams::default()
        };

        let state = single
            .connect_at_startup(&Establisher::without_retry(connector), &params)
            .await
            .unwrap();
        assert_eq!(state, LinkState::Disconnected);
        assert!(single.get().is_none());
    }

    #[tokio::test]
    async fn explicit_refusal_is_fatal() {
        let single = SingleConnection::new();
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(refused());

        let err = single
            .connect_at_startup(
                &Establisher::without_retry(connector),
                &ConnectionParams::from_url("postgres://db/app"),
            )
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(single.get().is_none());
    }

    #[tokio::test]
    async fn disconnect_closes() {
        let single = SingleConnection::new();
        let connector = Arc::new(MockConnector::new());
        single
            .connect_at_startup(
                &Establisher::without_retry(connector.clone()),
                &ConnectionParams::from_url("postgres://db/app"),
            )
            .await
            .unwrap();

        assert!(single.disconnect().await);
        assert!(!single.disconnect().await);
        assert_eq!(single.state(), LinkState::Disconnected);
        assert_eq!(connector.opened()[0].closes(), 1);
    }
}
