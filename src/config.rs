#![forbid(unsafe_code)]

// Server configuration, loaded from environment variables with defaults.

use rand::{distr::Alphanumeric, Rng};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SHORT_CODE_LENGTH: usize = 6;
const DEFAULT_MAX_QUEUE_SIZE: usize = 16;
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 15 * 60;

/// Process-wide configuration consumed by the broker core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WS listen port.
    pub port: u16,
    /// HS256 signing secret for account and room tokens.
    pub secret: String,
    /// Length of generated room short codes.
    pub short_code_length: usize,
    /// Per-participant bounded queue capacity (>= 1).
    pub max_queue_size: usize,
    /// Account token lifetime. Room tokens are session-bound, not timed.
    pub token_lifetime: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Loads configuration from the environment.
    ///
    /// A missing `ROOMCAST_SECRET` falls back to a random per-process
    /// secret: tokens then die with the process, which matches the
    /// in-memory lifetime of everything they refer to.
    pub fn from_env() -> Self {
        let secret = match std::env::var("ROOMCAST_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("ROOMCAST_SECRET not set — using a random per-process secret; tokens will not survive a restart");
                rand::rng()
                    .sample_iter(Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect()
            }
        };

        let max_queue_size: usize = env_parse("MAX_MESSAGE_QUEUE_SIZE", DEFAULT_MAX_QUEUE_SIZE);
        if max_queue_size == 0 {
            warn!(
                "MAX_MESSAGE_QUEUE_SIZE=0 would block every broadcast, using {}",
                DEFAULT_MAX_QUEUE_SIZE
            );
        }

        let config = Self {
            port: env_parse("ROOMCAST_PORT", DEFAULT_PORT),
            secret,
            short_code_length: env_parse("SHORT_CODE_LENGTH", DEFAULT_SHORT_CODE_LENGTH),
            max_queue_size: if max_queue_size == 0 {
                DEFAULT_MAX_QUEUE_SIZE
            } else {
                max_queue_size
            },
            token_lifetime: Duration::from_secs(env_parse(
                "TOKEN_LIFETIME_SECS",
                DEFAULT_TOKEN_LIFETIME_SECS,
            )),
        };

        info!(
            "Config: port={} short_code_length={} max_queue_size={} token_lifetime={}s",
            config.port,
            config.short_code_length,
            config.max_queue_size,
            config.token_lifetime.as_secs()
        );

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Env-independent invariants only; from_env reads the real process
        // environment, so defaults are exercised through a fresh config.
        let config = ServerConfig {
            port: DEFAULT_PORT,
            secret: "s".to_string(),
            short_code_length: DEFAULT_SHORT_CODE_LENGTH,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            token_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS),
        };
        assert!(config.max_queue_size >= 1);
        assert!(config.short_code_length >= 1);
    }
}
