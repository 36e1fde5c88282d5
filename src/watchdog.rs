use crate::state::AppState;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// Spawn the stall watchdog: closes and advances stalled rounds every tick
/// and prunes idle players on its own, slower cadence
pub fn spawn_watchdog(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(state.config.watchdog_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut prune = tokio::time::interval(state.config.prune_interval);
        prune.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Watchdog running (tick {:?}, prune every {:?})",
            state.config.watchdog_tick,
            state.config.prune_interval
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let report = state.watchdog_tick(Utc::now()).await;
                    if !report.revealed.is_empty() || !report.advanced.is_empty() {
                        tracing::debug!(
                            "Watchdog revealed {:?}, advanced {:?}",
                            report.revealed,
                            report.advanced
                        );
                    }
                }
                _ = prune.tick() => {
                    let removed = state.prune_idle_players(Utc::now()).await;
                    if !removed.is_empty() {
                        tracing::info!("Pruned idle players {:?}", removed);
                    }
                }
            }
        }
    });
}
