//! Configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Missing or unparsable values fall back to defaults, except
//! `LISTEN_ADDR`, which must parse when set.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::client::HttpRecordStore;
use crate::domain::SignalChannel;
use crate::engine::SystemClock;
use crate::error::SyncError;
use crate::service::{SurfaceContext, SurfaceOptions};
use crate::store::FileStore;

/// Top-level configuration of the record store binary and of surfaces.
///
/// Loaded once at startup via [`SyncConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Socket address the reference record store binds to.
    pub listen_addr: SocketAddr,

    /// Base URL of the record store API, including the `/api/v1` prefix.
    pub record_store_url: String,

    /// Reconciliation poll interval.
    pub poll_interval: Duration,

    /// Clock re-derivation interval of surfaces.
    pub tick_interval: Duration,

    /// Capacity of the signal broadcast channel.
    pub signal_channel_capacity: usize,

    /// Per-request timeout of the record store client.
    pub http_timeout: Duration,

    /// Directory of the local persisted store.
    pub state_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            record_store_url: "http://127.0.0.1:3000/api/v1".to_string(),
            poll_interval: Duration::from_millis(3000),
            tick_interval: Duration::from_millis(100),
            signal_channel_capacity: 256,
            http_timeout: Duration::from_millis(5000),
            state_dir: PathBuf::from("./.tableclock"),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.listen_addr,
        };
        let record_store_url =
            std::env::var("RECORD_STORE_URL").unwrap_or(defaults.record_store_url);

        Ok(Self {
            listen_addr,
            record_store_url,
            poll_interval: parse_env_ms("POLL_INTERVAL_MS", defaults.poll_interval),
            tick_interval: parse_env_ms("TICK_INTERVAL_MS", defaults.tick_interval),
            signal_channel_capacity: parse_env(
                "SIGNAL_CHANNEL_CAPACITY",
                defaults.signal_channel_capacity,
            )
            .max(1),
            http_timeout: parse_env_ms("HTTP_TIMEOUT_MS", defaults.http_timeout),
            state_dir: std::env::var("STATE_DIR").map_or(defaults.state_dir, PathBuf::from),
        })
    }

    /// Tick and poll cadences for surfaces.
    #[must_use]
    pub const fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            tick_interval: self.tick_interval,
            poll_interval: self.poll_interval,
        }
    }

    /// Builds the collaborators of a surface: an HTTP record store client,
    /// a file-backed local store in [`Self::state_dir`] and the system
    /// clock. Surfaces of one profile must share `signals`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Transport`] if the HTTP client cannot be built.
    /// - [`SyncError::Storage`] if the state directory cannot be created.
    pub fn surface_context(&self, signals: SignalChannel) -> Result<SurfaceContext, SyncError> {
        let store = HttpRecordStore::new(self.record_store_url.clone(), self.http_timeout)?;
        let kv = FileStore::open(self.state_dir.clone())?;
        Ok(SurfaceContext {
            store: Arc::new(store),
            kv: Arc::new(kv),
            signals,
            clock: Arc::new(SystemClock),
            options: self.surface_options(),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a millisecond duration; zero counts as invalid.
fn parse_env_ms(key: &str, default: Duration) -> Duration {
    match parse_env::<u64>(key, 0) {
        0 => default,
        ms => Duration::from_millis(ms),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert!(config.record_store_url.ends_with("/api/v1"));
        assert_eq!(config.surface_options(), SurfaceOptions::default());
    }

    #[test]
    fn missing_variables_fall_back() {
        assert_eq!(parse_env("TABLECLOCK_TEST_UNSET_VAR", 7_usize), 7);
        assert_eq!(
            parse_env_ms("TABLECLOCK_TEST_UNSET_MS", Duration::from_millis(42)),
            Duration::from_millis(42)
        );
    }

    #[tokio::test]
    async fn surface_context_uses_state_dir() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir failed");
        };
        let config = SyncConfig {
            state_dir: dir.path().join("profile"),
            ..SyncConfig::default()
        };
        let Ok(ctx) = config.surface_context(SignalChannel::new(8)) else {
            panic!("context failed");
        };
        assert_eq!(ctx.options, config.surface_options());
        assert!(dir.path().join("profile").is_dir());
    }
}
