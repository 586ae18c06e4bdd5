//! Server configuration, read from the environment at startup

use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    pub pacing: Pacing,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("FORTUNED_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.fortuned/fortuned.db")
        });

        let port: u16 = std::env::var("FORTUNED_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        Self {
            port,
            db_path,
            pacing: Pacing::default(),
        }
    }
}

/// Stream pacing knobs.
///
/// These shape the client's "typing" experience only; nothing in the wire
/// protocol depends on them. Replay slices are measured in code points so a
/// slice never splits a character.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub replay_chunk_chars: usize,
    pub replay_delay: Duration,
    pub live_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            replay_chunk_chars: 100,
            replay_delay: Duration::from_millis(100),
            live_delay: Duration::from_millis(100),
        }
    }
}

impl Pacing {
    /// Zero-delay pacing for tests
    #[allow(dead_code)]
    pub fn instant() -> Self {
        Self {
            replay_delay: Duration::ZERO,
            live_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
