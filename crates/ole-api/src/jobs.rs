//! Background jobs for periodic maintenance tasks.
//!
//! Expired sessions are evicted lazily when looked up; this job also removes
//! the ones whose browser never comes back.

use std::time::Duration;

use tokio::time::interval;

use crate::{metrics::record_active_sessions, session::SessionRegistry};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Start all background jobs
///
/// Returns join handles that can be aborted on shutdown
pub fn start_background_jobs(sessions: SessionRegistry) -> Vec<tokio::task::JoinHandle<()>> {
    vec![tokio::spawn(periodic_session_cleanup_job(
        sessions,
        SESSION_CLEANUP_INTERVAL,
    ))]
}

async fn periodic_session_cleanup_job(sessions: SessionRegistry, period: Duration) {
    let mut interval = interval(period);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        run_session_cleanup(&sessions);
    }
}

fn run_session_cleanup(sessions: &SessionRegistry) -> usize {
    let removed = sessions.purge_expired();
    let remaining = sessions.len();
    record_active_sessions(remaining);

    if removed > 0 {
        tracing::info!(removed, remaining, "Session cleanup complete");
    } else {
        tracing::debug!("Session cleanup complete: no expired sessions found");
    }
    removed
}
