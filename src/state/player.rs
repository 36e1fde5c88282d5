use super::AppState;
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Safe character set for short codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;
const MAX_NAME_LEN: usize = 32;

/// Generate a random short code (5 characters)
fn generate_short_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

fn generate_display_name() -> String {
    petname::petname(2, " ").unwrap_or_else(|| format!("Player {}", generate_short_code()))
}

impl AppState {
    /// Add a connected player, generating a name when none is given
    pub async fn join_player(&self, display_name: Option<String>) -> Player {
        let display_name = display_name
            .map(|name| name.trim().chars().take(MAX_NAME_LEN).collect::<String>())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(generate_display_name);

        let mut players = self.players.write().await;
        let token = loop {
            let code = generate_short_code();
            if !players.values().any(|p| p.token == code) {
                break code;
            }
        };

        let seq = players.values().map(|p| p.seq + 1).max().unwrap_or(0);
        let player = Player {
            id: ulid::Ulid::new().to_string(),
            seq,
            token,
            display_name,
            ready: false,
            connected: true,
            last_seen: Utc::now(),
        };
        players.insert(player.id.clone(), player.clone());

        tracing::info!("Player {} joined as {:?}", player.id, player.display_name);
        player
    }

    /// Reattach a returning player by their reconnect token
    pub async fn rejoin_player(&self, token: &str) -> Option<Player> {
        let mut players = self.players.write().await;
        let player = players.values_mut().find(|p| p.token == token)?;
        player.connected = true;
        player.last_seen = Utc::now();
        Some(player.clone())
    }

    pub async fn get_player(&self, player_id: &str) -> Option<Player> {
        self.players.read().await.get(player_id).cloned()
    }

    pub async fn get_player_by_token(&self, token: &str) -> Option<Player> {
        self.players
            .read()
            .await
            .values()
            .find(|p| p.token == token)
            .cloned()
    }

    pub async fn set_ready(&self, player_id: &str, ready: bool) -> SessionResult<Player> {
        let mut players = self.players.write().await;
        let player = players
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(format!("player {}", player_id)))?;
        player.ready = ready;
        player.last_seen = Utc::now();
        Ok(player.clone())
    }

    /// Record activity for idle pruning; unknown players are ignored
    pub async fn touch_player(&self, player_id: &str) {
        self.touch_player_at(player_id, Utc::now()).await;
    }

    pub(crate) async fn touch_player_at(&self, player_id: &str, at: DateTime<Utc>) {
        if let Some(player) = self.players.write().await.get_mut(player_id) {
            player.last_seen = at;
        }
    }

    pub async fn set_connected(&self, player_id: &str, connected: bool) {
        if let Some(player) = self.players.write().await.get_mut(player_id) {
            player.connected = connected;
            if connected {
                player.last_seen = Utc::now();
            }
        }
    }

    /// All players in join order
    pub async fn list_players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.read().await.values().cloned().collect();
        players.sort_by_key(|p| p.seq);
        players
    }

    /// Players to snapshot into a new session: ready ones, else everyone present
    pub async fn session_candidates(&self) -> Vec<PlayerId> {
        let players = self.list_players().await;
        let ready: Vec<PlayerId> = players
            .iter()
            .filter(|p| p.connected && p.ready)
            .map(|p| p.id.clone())
            .collect();
        if !ready.is_empty() {
            return ready;
        }
        players
            .into_iter()
            .filter(|p| p.connected)
            .map(|p| p.id)
            .collect()
    }

    pub async fn display_name_of(&self, player_id: &str) -> Option<String> {
        self.players
            .read()
            .await
            .get(player_id)
            .map(|p| p.display_name.clone())
    }

    /// Remove a player from the roster and from the current session's active set
    pub async fn remove_player(&self, player_id: &str) -> SessionResult<Player> {
        let player = self
            .players
            .write()
            .await
            .remove(player_id)
            .ok_or_else(|| SessionError::NotFound(format!("player {}", player_id)))?;

        if let Some(session_id) = self.current_session_id().await {
            let uid = player_id.to_string();
            let result = self
                .store
                .update_session(&session_id, |session| {
                    session.active_player_uids.retain(|p| *p != uid);
                    Ok(())
                })
                .await;
            if let Err(e) = result {
                tracing::warn!("Could not drop {} from session {}: {}", player_id, session_id, e);
            }
        }

        tracing::info!("Removed player {} (token: {})", player_id, player.token);
        Ok(player)
    }
}
