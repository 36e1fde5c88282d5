//! State export/import for restoring a party after a server restart.
//!
//! Snapshots cover every persisted collection of the session store plus the
//! player roster. Runtime-only parts are left out:
//! - Broadcast channels (recreated at startup)
//! - Pending bingo claims (settled before a claim call returns)
//! - Reveal/advance keys (rebuilt from the imported sessions)

use super::{AppState, RoundKey};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateExport {
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub current_session: Option<SessionId>,
    pub sessions: HashMap<SessionId, Session>,
    pub manifests: HashMap<SessionId, SelectionManifest>,
    pub answers: HashMap<SessionId, Vec<Answer>>,
    pub scores: HashMap<SessionId, Vec<ScoreEntry>>,
    /// Award ledger keys already applied
    #[serde(default)]
    pub applied_awards: HashSet<String>,
    #[serde(default)]
    pub drawings: HashMap<SessionId, LiveDrawing>,
    #[serde(default)]
    pub guesses: HashMap<SessionId, Vec<Guess>>,
    #[serde(default)]
    pub processed_guess_ids: HashMap<SessionId, HashSet<(usize, GuessId)>>,
    #[serde(default)]
    pub cards: HashMap<SessionId, Vec<BingoCard>>,
    pub players: HashMap<PlayerId, Player>,
}

impl SessionStateExport {
    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        if let Some(ref current) = self.current_session {
            if !self.sessions.contains_key(current) {
                return Err(format!(
                    "Current session '{}' not found in export",
                    current
                ));
            }
        }

        for (id, session) in &self.sessions {
            if id != &session.id {
                return Err(format!("Session stored under '{}' has id '{}'", id, session.id));
            }
            if session.game != GameKind::BallDraw && !self.manifests.contains_key(id) {
                return Err(format!("Session '{}' has no selection manifest", id));
            }
            if session.reveal_data.is_some() && !session.status.is_reveal_class() {
                return Err(format!(
                    "Session '{}' carries reveal data while {:?}",
                    id, session.status
                ));
            }
        }

        let dangling = self
            .manifests
            .keys()
            .chain(self.answers.keys())
            .chain(self.scores.keys())
            .chain(self.drawings.keys())
            .chain(self.guesses.keys())
            .chain(self.cards.keys())
            .find(|id| !self.sessions.contains_key(*id));
        if let Some(id) = dangling {
            return Err(format!(
                "Records reference session '{}' which doesn't exist",
                id
            ));
        }

        Ok(())
    }
}

impl AppState {
    /// Snapshot the whole store and roster
    pub async fn export_state(&self) -> SessionStateExport {
        let store = &self.store;
        SessionStateExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            current_session: self.current_session_id().await,
            sessions: store.sessions.read().await.clone(),
            manifests: store.manifests.read().await.clone(),
            answers: store
                .answers
                .read()
                .await
                .iter()
                .map(|(id, by_key)| (id.clone(), by_key.values().cloned().collect()))
                .collect(),
            scores: store
                .scores
                .read()
                .await
                .iter()
                .map(|(id, by_uid)| (id.clone(), by_uid.values().cloned().collect()))
                .collect(),
            applied_awards: store.applied_awards.read().await.clone(),
            drawings: store.drawings.read().await.clone(),
            guesses: store.guesses.read().await.clone(),
            processed_guess_ids: store.processed_guess_ids.read().await.clone(),
            cards: store
                .cards
                .read()
                .await
                .iter()
                .map(|(id, by_uid)| (id.clone(), by_uid.values().cloned().collect()))
                .collect(),
            players: self.players.read().await.clone(),
        }
    }

    /// Replace all state with a validated snapshot
    pub async fn import_state(&self, export: SessionStateExport) -> Result<(), String> {
        export.validate()?;

        let store = &self.store;
        // Reveals already shown must not be scored again
        let revealed: HashSet<RoundKey> = export
            .sessions
            .values()
            .filter(|s| s.status.is_reveal_class())
            .map(|s| {
                let step = s.bingo().map(|b| b.bingo_winners.len()).unwrap_or(0);
                RoundKey::new(s).with_step(step)
            })
            .collect();

        *store.manifests.write().await = export.manifests;
        *store.answers.write().await = export
            .answers
            .into_iter()
            .map(|(id, answers)| {
                let by_key = answers
                    .into_iter()
                    .map(|a| ((a.uid.clone(), a.question_index), a))
                    .collect();
                (id, by_key)
            })
            .collect();
        *store.scores.write().await = export
            .scores
            .into_iter()
            .map(|(id, entries)| {
                let by_uid = entries.into_iter().map(|e| (e.uid.clone(), e)).collect();
                (id, by_uid)
            })
            .collect();
        *store.applied_awards.write().await = export.applied_awards;
        *store.drawings.write().await = export.drawings;
        *store.guesses.write().await = export.guesses;
        *store.processed_guess_ids.write().await = export.processed_guess_ids;
        *store.cards.write().await = export
            .cards
            .into_iter()
            .map(|(id, cards)| {
                let by_uid = cards.into_iter().map(|c| (c.uid.clone(), c)).collect();
                (id, by_uid)
            })
            .collect();
        store.claims.lock().await.clear();
        *store.sessions.write().await = export.sessions;

        *self.players.write().await = export.players;
        *self.current_session.write().await = export.current_session;

        *self.revealed_keys.lock().await = revealed;
        self.advanced_keys.lock().await.clear();
        self.claim_gate.lock().await.clear();

        tracing::info!(
            "Imported state exported at {} (schema v{})",
            export.exported_at,
            export.schema_version
        );

        if let Some(session) = self.current_session().await {
            self.broadcast_to_all(crate::protocol::ServerMessage::SessionState { session });
        }
        Ok(())
    }
}
