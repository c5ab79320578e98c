//! dbweb-core: session and connection lifecycle for the dbweb server
//!
//! Owns live backend connections, shares them across concurrent requests,
//! evicts idle ones and governs how a connection is first established.

pub mod backend;
pub mod error;
pub mod establish;
pub mod gate;
pub mod handle;
pub mod metrics;
pub mod params;
pub mod reaper;
pub mod registry;
pub mod single;
pub mod store;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use backend::{Backend, Connector, MockBackend, MockConnector, MockProbe, PgConnector};
pub use error::{ConnectError, EstablishError, FailureAction, RegistryError, Rejection};
pub use establish::Establisher;
pub use gate::{Gate, GateDecision};
pub use handle::ConnectionHandle;
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use params::ConnectionParams;
pub use reaper::IdleReaper;
pub use registry::SessionRegistry;
pub use single::{LinkState, SingleConnection};
pub use store::{ConnectionStore, StoreMode};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
