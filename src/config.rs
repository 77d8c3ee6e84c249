//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{ShelfOptions, DEFAULT_MAX_SIZE};
use crate::error::Result;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one file per cached key
    pub cache_dir: PathBuf,
    /// Open flag for the cache directory (`r`, `w`, `c` or `n`, optionally with `s`)
    pub cache_flag: String,
    /// Text encoding for keys (any WHATWG label that can encode, e.g. `utf-8`, `latin1`)
    pub key_encoding: String,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL (0 = never expire)
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep-and-sync interval in seconds
    pub sync_interval: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory (default: ./filecache)
    /// - `CACHE_FLAG` - Open flag (default: c)
    /// - `KEY_ENCODING` - Text encoding for keys (default: utf-8)
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 300)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SYNC_INTERVAL` - Sweep and sync frequency in seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_flag: env::var("CACHE_FLAG").unwrap_or(defaults.cache_flag),
            key_encoding: env::var("KEY_ENCODING").unwrap_or(defaults.key_encoding),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sync_interval: env_or("SYNC_INTERVAL", defaults.sync_interval),
        }
    }

    /// Shelf options for opening `cache_dir`. Fails on an invalid flag or
    /// key encoding.
    pub fn shelf_options(&self) -> Result<ShelfOptions> {
        Ok(ShelfOptions::new()
            .flag(&self.cache_flag)?
            .key_encoding(self.key_encoding.parse()?)
            .max_size(self.max_entries)
            .default_timeout(Duration::from_secs(self.default_ttl)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./filecache"),
            cache_flag: "c".to_string(),
            key_encoding: "utf-8".to_string(),
            max_entries: DEFAULT_MAX_SIZE,
            default_ttl: 0,
            server_port: 3000,
            sync_interval: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache_dir, PathBuf::from("./filecache"));
        assert_eq!(config.cache_flag, "c");
        assert_eq!(config.key_encoding, "utf-8");
        assert_eq!(config.max_entries, 300);
        assert_eq!(config.default_ttl, 0);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sync_interval, 5);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_DIR",
            "CACHE_FLAG",
            "KEY_ENCODING",
            "MAX_ENTRIES",
            "DEFAULT_TTL",
            "SERVER_PORT",
            "SYNC_INTERVAL",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.cache_flag, "c");
        assert_eq!(config.max_entries, 300);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sync_interval, 5);
    }

    #[test]
    fn test_shelf_options() {
        let config = Config {
            cache_flag: "ns".to_string(),
            key_encoding: "latin1".to_string(),
            max_entries: 10,
            default_ttl: 60,
            ..Config::default()
        };
        let options = config.shelf_options().unwrap();
        assert!(options.flags.immediate);
        assert_eq!(options.max_size, 10);
        assert_eq!(options.default_timeout, Duration::from_secs(60));
        assert_eq!(options.key_encoding.name(), "windows-1252");
    }

    #[test]
    fn test_shelf_options_rejects_bad_encoding() {
        let config = Config {
            key_encoding: "utf-16".to_string(),
            ..Config::default()
        };
        assert!(config.shelf_options().is_err());
    }

    #[test]
    fn test_shelf_options_rejects_bad_flag() {
        let config = Config {
            cache_flag: "q".to_string(),
            ..Config::default()
        };
        assert!(config.shelf_options().is_err());
    }
}
