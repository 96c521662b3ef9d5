//! Background sweep that expires stuck and idle sessions.

use crate::sessions::registry::SessionRegistry;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Run [`SessionRegistry::sweep`] every `sweep_interval` until aborted.
pub fn spawn_sweeper(registry: SessionRegistry) -> JoinHandle<()> {
    let period = registry.policy().sweep_interval();
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = registry.sweep();
            debug!(
                removed = report.removed(),
                active = registry.active_count(),
                "Session sweep finished"
            );
        }
    })
}
