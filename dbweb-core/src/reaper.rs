//! Idle session reaper
//!
//! Background task that periodically closes sessions whose connection has
//! been idle longer than the configured timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::SessionRegistry;

/// How often a sweep runs
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    /// Zero disables reaping
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, idle_timeout: Duration) -> Self {
        Self {
            registry,
            idle_timeout,
            interval: SWEEP_INTERVAL,
        }
    }

    /// Override the sweep period. A zero period keeps [`SWEEP_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            SWEEP_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep at the current time. Returns the number of sessions closed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// One sweep as of `now`.
    ///
    /// Candidates are collected from a snapshot, then each removal re-checks
    /// idleness on the entry present at that moment, so a session touched or
    /// replaced in between survives.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        if self.idle_timeout.is_zero() {
            return 0;
        }

        debug!("starting idle sessions cleanup");

        let timeout = self.idle_timeout;
        let stale: Vec<String> = self
            .registry
            .sessions()
            .into_iter()
            .filter(|(_, handle)| handle.idle_for(now) > timeout)
            .map(|(id, _)| id)
            .collect();

        let mut removed = 0;
        for id in stale {
            debug!(session = %id, "closing stale session");
            if self
                .registry
                .remove_if(&id, |handle| handle.idle_for(now) > timeout)
                .await
            {
                removed += 1;
            }
        }

        debug!(removed, "removed idle sessions");
        removed
    }

    /// Sweep forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Sweep on every interval tick until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if self.idle_timeout.is_zero() {
            info!("session idle timeout disabled");
        } else {
            info!(
                timeout_secs = self.idle_timeout.as_secs(),
                interval_secs = self.interval.as_secs(),
                "session manager cleanup enabled"
            );
        }

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = &mut shutdown => {
                    debug!("session reaper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockProbe};
    use crate::handle::ConnectionHandle;
    use crate::metrics::NoopMetrics;
    use crate::params::ConnectionParams;
    use chrono::TimeDelta;

    const TIMEOUT: Duration = Duration::from_secs(180 * 60);

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(Arc::new(NoopMetrics)))
    }

    fn add_idle(
        registry: &SessionRegistry,
        id: &str,
        now: DateTime<Utc>,
        idle: TimeDelta,
    ) -> Arc<MockProbe> {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let handle = ConnectionHandle::new(Box::new(backend), ConnectionParams::default());
        handle.touch_at(now - idle);
        registry.add(id, Arc::new(handle)).unwrap();
        probe
    }

    #[tokio::test]
    async fn removes_only_stale_sessions() {
        let registry = registry();
        let now = Utc::now();
        let fresh = add_idle(&registry, "fresh", now, TimeDelta::minutes(5));
        let boundary = add_idle(&registry, "boundary", now, TimeDelta::minutes(180));
        let stale = add_idle(&registry, "stale", now, TimeDelta::minutes(181));
        let ancient = add_idle(&registry, "ancient", now, TimeDelta::days(3));

        let reaper = IdleReaper::new(registry.clone(), TIMEOUT);
        assert_eq!(reaper.sweep_at(now).await, 2);

        assert_eq!(registry.ids(), vec!["boundary".to_string(), "fresh".to_string()]);
        assert_eq!(fresh.closes(), 0);
        assert_eq!(boundary.closes(), 0);
        assert_eq!(stale.closes(), 1);
        assert_eq!(ancient.closes(), 1);
    }

    #[tokio::test]
    async fn zero_timeout_is_disabled() {
        let registry = registry();
        let now = Utc::now();
        add_idle(&registry, "ancient", now, TimeDelta::days(30));

        let reaper = IdleReaper::new(registry.clone(), Duration::ZERO);
        assert_eq!(reaper.sweep_at(now).await, 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_failure_does_not_stop_sweep() {
        let registry = registry();
        let now = Utc::now();
        let broken = add_idle(&registry, "a", now, TimeDelta::days(1));
        broken.fail_close();
        let healthy = add_idle(&registry, "b", now, TimeDelta::days(1));

        let reaper = IdleReaper::new(registry.clone(), TIMEOUT);
        assert_eq!(reaper.sweep_at(now).await, 2);
        assert!(registry.is_empty());
        assert_eq!(healthy.closes(), 1);
    }

    #[tokio::test]
    async fn recheck_spares_touched_session() {
        let registry = registry();
        let now = Utc::now();
        add_idle(&registry, "a", now, TimeDelta::days(1));

        // Activity lands between the snapshot and the removal decision
        let handle = registry.get("a").unwrap();
        handle.touch_at(now);
        assert!(!registry.remove_if("a", |h| h.idle_for(now) > TIMEOUT).await);

        let reaper = IdleReaper::new(registry.clone(), TIMEOUT);
        assert_eq!(reaper.sweep_at(now).await, 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_stops_on_shutdown() {
        let registry = registry();
        add_idle(&registry, "old", Utc::now(), TimeDelta::days(1));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let reaper = IdleReaper::new(registry.clone(), TIMEOUT)
            .with_interval(Duration::from_secs(60));
        let task = tokio::spawn(reaper.run_until(async move {
            let _ = rx.await;
        }));

        // First sweep fires one interval after start
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_keeps_default_period() {
        let registry = registry();
        add_idle(&registry, "old", Utc::now(), TimeDelta::days(1));

        let reaper = IdleReaper::new(registry.clone(), TIMEOUT).with_interval(Duration::ZERO);
        assert_eq!(reaper.interval(), SWEEP_INTERVAL);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(reaper.run_until(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(SWEEP_INTERVAL + Duration::from_secs(1)).await;
        assert!(registry.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
