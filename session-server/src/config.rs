use std::env;
use std::time::Duration;

use session_core::SessionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub total_rounds: u32,
    pub round_advance_seconds: u64,
    pub restart_settle_seconds: u64,
    pub finalize_grace_seconds: u64,
    pub host_picks_secret: bool,
    pub room_timeout_minutes: u64,
    pub connection_timeout_seconds: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            total_rounds: env::var("TOTAL_ROUNDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("Invalid TOTAL_ROUNDS"),
            round_advance_seconds: env::var("ROUND_ADVANCE_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("Invalid ROUND_ADVANCE_SECONDS"),
            restart_settle_seconds: env::var("RESTART_SETTLE_SECONDS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .expect("Invalid RESTART_SETTLE_SECONDS"),
            finalize_grace_seconds: env::var("FINALIZE_GRACE_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("Invalid FINALIZE_GRACE_SECONDS"),
            host_picks_secret: env::var("HOST_PICKS_SECRET")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .expect("Invalid HOST_PICKS_SECRET"),
            room_timeout_minutes: env::var("ROOM_TIMEOUT_MINUTES")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .expect("Invalid ROOM_TIMEOUT_MINUTES"),
            connection_timeout_seconds: env::var("CONNECTION_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("Invalid CONNECTION_TIMEOUT_SECONDS"),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            total_rounds: self.total_rounds,
            round_advance_delay: Duration::from_secs(self.round_advance_seconds),
            restart_settle_delay: Duration::from_secs(self.restart_settle_seconds),
            finalize_grace: Duration::from_secs(self.finalize_grace_seconds),
            host_picks_secret: self.host_picks_secret,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
