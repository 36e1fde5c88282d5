// Public API for integration tests and potential library usage

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod fuzzy;
pub mod protocol;
pub mod state;
pub mod types;
pub mod watchdog;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;
