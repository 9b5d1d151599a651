use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::LearningEngine;

/// Abandon open sessions past their maximum age.
pub(crate) async fn run(engine: &LearningEngine, max_age: Duration) {
    let start = Instant::now();
    debug!("starting session cleanup cycle");

    match engine.abandon_stale_sessions(max_age).await {
        Ok(abandoned) => {
            info!(
                abandoned_sessions = abandoned,
                duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
                "session cleanup completed"
            );
        }
        Err(err) => {
            warn!(error = %err, "session cleanup failed");
        }
    }
}
