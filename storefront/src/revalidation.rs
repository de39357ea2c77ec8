use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::user_session::SessionManager;

pub const DEFAULT_REVALIDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Background task re-checking the session token on a fixed period.
///
/// Stopped by [`RevalidationTask::shutdown`]; dropping the handle aborts it.
pub struct RevalidationTask {
    shutdown_tx: watch::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl RevalidationTask {
    pub fn spawn(session: SessionManager, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(run(session, period, shutdown_rx));
        info!(?period, "Session revalidation started");
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Session revalidation stopped");
    }
}

impl Drop for RevalidationTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[instrument(skip_all)]
async fn run(session: SessionManager, period: Duration, mut shutdown_rx: watch::Receiver<()>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Shutdown requested");
                return;
            }
            _ = interval.tick() => {
                if session.token().is_none() {
                    debug!("{period:?} passed, no token held, skipping");
                    continue;
                }
                debug!("{period:?} passed, revalidating session");
                if session.revalidate().await.is_none() {
                    info!("Session no longer valid, cleared");
                }
            }
        }
    }
}
