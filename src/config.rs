//! Runtime configuration read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::types::GameKind;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// JSON content catalog; the built-in catalog is used when unset
    pub content_path: Option<PathBuf>,
    /// Active players silent for longer than this are pruned
    pub idle_threshold: Duration,
    pub watchdog_tick: Duration,
    pub prune_interval: Duration,
    /// Auto-advance delay after a quiz-family reveal
    pub quick_advance: Duration,
    /// Auto-advance delay after a drawing, buzzer or bingo reveal
    pub long_advance: Duration,
    pub default_round_seconds: u32,
    pub default_round_count: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            content_path: None,
            idle_threshold: Duration::from_secs(120),
            watchdog_tick: Duration::from_millis(1000),
            prune_interval: Duration::from_secs(5),
            quick_advance: Duration::from_secs(6),
            long_advance: Duration::from_secs(12),
            default_round_seconds: 20,
            default_round_count: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            port: env_or("PORT", defaults.port),
            content_path: std::env::var("CONTENT_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            idle_threshold: Duration::from_secs(env_or(
                "IDLE_THRESHOLD_SECS",
                defaults.idle_threshold.as_secs(),
            )),
            watchdog_tick: Duration::from_millis(positive_or(
                "WATCHDOG_TICK_MS",
                defaults.watchdog_tick.as_millis() as u64,
            )),
            prune_interval: Duration::from_secs(positive_or(
                "PRUNE_INTERVAL_SECS",
                defaults.prune_interval.as_secs(),
            )),
            quick_advance: Duration::from_secs(env_or(
                "QUICK_ADVANCE_SECS",
                defaults.quick_advance.as_secs(),
            )),
            long_advance: Duration::from_secs(env_or(
                "LONG_ADVANCE_SECS",
                defaults.long_advance.as_secs(),
            )),
            default_round_seconds: env_or("DEFAULT_ROUND_SECONDS", defaults.default_round_seconds),
            default_round_count: env_or("DEFAULT_ROUND_COUNT", defaults.default_round_count),
        };

        tracing::info!(
            port = config.port,
            content_path = ?config.content_path,
            idle_threshold_secs = config.idle_threshold.as_secs(),
            "Config loaded"
        );

        config
    }

    /// How long a reveal stays on screen before the next round starts
    pub fn advance_delay(&self, game: GameKind) -> Duration {
        if game.is_question_round() {
            self.quick_advance
        } else {
            self.long_advance
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Like `env_or`, but zero is rejected (timer periods must be non-zero)
fn positive_or(key: &str, default: u64) -> u64 {
    match env_or(key, default) {
        0 => {
            tracing::warn!("Ignoring {}=0, using default", key);
            default
        }
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "PORT",
        "CONTENT_PATH",
        "IDLE_THRESHOLD_SECS",
        "WATCHDOG_TICK_MS",
        "PRUNE_INTERVAL_SECS",
        "QUICK_ADVANCE_SECS",
        "DEFAULT_ROUND_COUNT",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = AppConfig::from_env();

        assert_eq!(config.port, 8080);
        assert!(config.content_path.is_none());
        assert_eq!(config.idle_threshold, Duration::from_secs(120));
        assert_eq!(config.watchdog_tick, Duration::from_millis(1000));
        assert_eq!(config.default_round_count, 5);
    }

    #[test]
    #[serial]
    fn test_reads_env_overrides() {
        clear_env();
        std::env::set_var("PORT", "9001");
        std::env::set_var("CONTENT_PATH", "/tmp/content.json");
        std::env::set_var("IDLE_THRESHOLD_SECS", "30");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 9001);
        assert_eq!(config.content_path, Some(PathBuf::from("/tmp/content.json")));
        assert_eq!(config.idle_threshold, Duration::from_secs(30));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("QUICK_ADVANCE_SECS", "-3");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.quick_advance, Duration::from_secs(6));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_intervals_fall_back() {
        clear_env();
        std::env::set_var("WATCHDOG_TICK_MS", "0");
        std::env::set_var("PRUNE_INTERVAL_SECS", "0");

        let config = AppConfig::from_env();
        assert_eq!(config.watchdog_tick, Duration::from_millis(1000));
        assert_eq!(config.prune_interval, Duration::from_secs(5));
        clear_env();
    }

    #[test]
    fn test_advance_delay_by_game() {
        let config = AppConfig::default();
        assert_eq!(config.advance_delay(GameKind::Quiz), config.quick_advance);
        assert_eq!(config.advance_delay(GameKind::TeamBuzzer), config.long_advance);
        assert_eq!(config.advance_delay(GameKind::BallDraw), config.long_advance);
    }
}
