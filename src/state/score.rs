use crate::error::SessionResult;
use crate::state::AppState;
use crate::types::*;

/// Points earned by one player in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub uid: PlayerId,
    pub points: u32,
}

impl Award {
    pub fn new(uid: impl Into<PlayerId>, points: u32) -> Self {
        Self {
            uid: uid.into(),
            points,
        }
    }
}

/// Ledger key for a round's awards, e.g. `quiz:3`
pub fn award_key(game: GameKind, index: usize) -> String {
    format!("{}:{}", game.as_str(), index)
}

impl AppState {
    /// Apply a round's awards as increments; replays of the same key add nothing.
    /// Returns how many increments were applied.
    pub async fn apply_awards(&self, session_id: &str, key: &str, awards: &[Award]) -> usize {
        let mut applied = 0;
        for award in awards.iter().filter(|a| a.points > 0) {
            if self
                .store
                .increment_score(session_id, &award.uid, award.points, key)
                .await
            {
                applied += 1;
            } else {
                tracing::debug!("Award {} for {} already applied", key, award.uid);
            }
        }
        applied
    }

    /// Cumulative scores for a session, highest first
    pub async fn leaderboard(&self, session_id: &str) -> SessionResult<Vec<ScoreEntry>> {
        // Fails with NotFound for unknown sessions
        self.store.get_session(session_id).await?;
        Ok(self.store.leaderboard(session_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::state::test_support::*;

    #[tokio::test]
    async fn test_apply_awards_once_per_key() {
        let state = test_state();
        let awards = vec![Award::new("p1", 10), Award::new("p2", 10), Award::new("p3", 0)];

        assert_eq!(state.apply_awards("s1", "quiz:0", &awards).await, 2);
        assert_eq!(state.apply_awards("s1", "quiz:0", &awards).await, 0);

        assert_eq!(state.store.score_of("s1", "p1").await, 10);
        assert_eq!(state.store.score_of("s1", "p3").await, 0);
    }

    #[tokio::test]
    async fn test_leaderboard_unknown_session() {
        let state = test_state();
        let result = state.leaderboard("ghost").await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_award_key_format() {
        assert_eq!(award_key(GameKind::PictureGuess, 3), "picture-guess:3");
    }
}
