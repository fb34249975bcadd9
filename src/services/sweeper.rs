//! Periodic cleanup of abandoned rooms.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::state::SharedState;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Delete rooms with no connected players that outlived the stale age.
///
/// Spawned once from `main` and runs for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a restart does not sweep
    // straight away.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let removed = state.registry().lock().await.sweep();
        if !removed.is_empty() {
            info!(count = removed.len(), codes = ?removed, "stale rooms swept");
        }
    }
}
