mod session_cleanup;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::engine::LearningEngine;

/// Background maintenance loops. Currently one: stale-session cleanup.
pub struct WorkerManager {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl WorkerManager {
    pub fn start(
        engine: Arc<LearningEngine>,
        interval: Duration,
        session_max_age: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let notify = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        session_cleanup::run(&engine, session_max_age).await;
                    }
                    _ = notify.notified() => break,
                }
            }
            tracing::info!("worker loop stopped");
        });
        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        // notify_one stores a permit, so a stop issued between ticks is not
        // lost.
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}
