//! Stall detection: closes rounds that ran out of time or that every active
//! player has answered, advances reveals after a delay, and prunes idle
//! players so they stop blocking "everyone answered".
//!
//! Everything here re-reads the session at fire time and relies on the
//! reveal/advance keys, so duplicate or overlapping ticks are harmless.

use super::{AppState, RoundKey};
use crate::error::SessionResult;
use crate::types::*;
use chrono::{DateTime, Utc};

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchdogReport {
    pub revealed: Vec<SessionId>,
    pub advanced: Vec<SessionId>,
}

impl AppState {
    /// Check every running session once
    pub async fn watchdog_tick(&self, now: DateTime<Utc>) -> WatchdogReport {
        let mut report = WatchdogReport::default();
        for session_id in self.store.session_ids().await {
            let session = match self.store.get_session(&session_id).await {
                Ok(session) => session,
                Err(_) => continue,
            };
            if session.status == SessionStatus::Finished {
                continue;
            }

            if session.status.is_answer_window() {
                match self.reveal_if_stalled(&session, now).await {
                    Ok(true) => report.revealed.push(session_id),
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Watchdog reveal failed for {}: {}", session_id, e),
                }
            } else if session.status.is_reveal_class() {
                match self.advance_if_due(&session, now).await {
                    Ok(true) => report.advanced.push(session_id),
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Watchdog advance failed for {}: {}", session_id, e),
                }
            }
        }
        report
    }

    async fn reveal_if_stalled(&self, session: &Session, now: DateTime<Utc>) -> SessionResult<bool> {
        if session.game == GameKind::BallDraw {
            return Ok(false);
        }

        let timed_out = session.question_ends_at.is_some_and(|ends| ends <= now);
        let everyone_answered = if session.game.is_question_round() {
            let (answered, active) = self.answer_progress(&session.id).await?;
            active > 0 && answered >= active
        } else {
            false
        };
        if !timed_out && !everyone_answered {
            return Ok(false);
        }

        tracing::debug!(
            "Watchdog closing round {} of {} (timed out: {})",
            session.question_index,
            session.id,
            timed_out
        );
        Ok(self
            .reveal(&session.id, session.question_index)
            .await?
            .is_some())
    }

    async fn advance_if_due(&self, session: &Session, now: DateTime<Utc>) -> SessionResult<bool> {
        let mut step = 0;
        if let GameState::Bingo(bingo) = &session.state {
            // First-winner games wait for the display to finish or continue
            if bingo.bingo_mode == BingoMode::First {
                return Ok(false);
            }
            step = bingo.bingo_winners.len();
        }

        let Some(started) = session.reveal_started_at else {
            return Ok(false);
        };
        let delay = chrono::Duration::from_std(self.config.advance_delay(session.game))
            .unwrap_or_else(|_| chrono::Duration::zero());
        if started + delay > now {
            return Ok(false);
        }

        let key = RoundKey::new(session).with_step(step);
        if !self.claim_advance(key.clone()).await {
            return Ok(false);
        }

        tracing::debug!("Watchdog advancing {} from round {}", session.id, session.question_index);
        match self.advance(&session.id, session.question_index).await {
            Ok(next) => Ok(next.is_some()),
            Err(e) => {
                self.release_advance(&key).await;
                Err(e)
            }
        }
    }

    /// Drop idle players from every running session's active set.
    /// The current drawer is never pruned. Returns the removed ids.
    pub async fn prune_idle_players(&self, now: DateTime<Utc>) -> Vec<PlayerId> {
        let threshold = chrono::Duration::from_std(self.config.idle_threshold)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let last_seen: Vec<(PlayerId, DateTime<Utc>)> = self
            .players
            .read()
            .await
            .values()
            .map(|p| (p.id.clone(), p.last_seen))
            .collect();
        let is_idle = |uid: &str| {
            last_seen
                .iter()
                .any(|(id, seen)| id == uid && *seen + threshold < now)
        };

        let mut removed = Vec::new();
        for session_id in self.store.session_ids().await {
            let Ok(session) = self.store.get_session(&session_id).await else {
                continue;
            };
            if session.status == SessionStatus::Finished {
                continue;
            }

            let drawer = match &session.state {
                GameState::Drawing(d) => d.drawer_uid.clone(),
                _ => None,
            };
            let idle: Vec<PlayerId> = session
                .active_player_uids
                .iter()
                .filter(|uid| drawer.as_ref() != Some(*uid) && is_idle(uid.as_str()))
                .cloned()
                .collect();
            if idle.is_empty() {
                continue;
            }

            let result = self
                .store
                .update_session(&session_id, |s| {
                    s.active_player_uids.retain(|uid| !idle.contains(uid));
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => {
                    tracing::info!("Pruned {} idle players from {}", idle.len(), session_id);
                    removed.extend(idle);
                }
                Err(e) => tracing::warn!("Could not prune idle players from {}: {}", session_id, e),
            }
        }
        removed
    }
}
