//! Server configuration loaded from environment variables.
//!
//! All knobs have defaults, so an empty environment yields a working server.
//! Invalid values (non-integer, zero where a positive value is required) are
//! startup errors rather than silent fallbacks.

use std::env;

use crate::error::{ChatError, Result};

/// Default listen address. A bare `:port` binds all interfaces.
pub const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Default maximum frame size in bytes (payload only, delimiter excluded).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Default per-connection outbound queue depth.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 128;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen address, e.g. `0.0.0.0:8080`
    pub listen_addr: String,
    /// Maximum accepted frame size in bytes
    pub max_frame_bytes: usize,
    /// Per-connection outbound queue depth
    pub write_queue_depth: usize,
    /// Per-read deadline in seconds (0 = disabled)
    pub read_timeout_secs: u64,
    /// Per-write deadline in seconds (0 = disabled)
    pub write_timeout_secs: u64,
    /// Inbound idle deadline in seconds, used when no read timeout is set
    /// (0 = disabled)
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: normalize_listen_addr(DEFAULT_LISTEN_ADDR),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
            read_timeout_secs: 0,
            write_timeout_secs: 0,
            idle_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Load configuration from `CHAT_SERVER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup_string(&lookup, "CHAT_SERVER_ADDR", DEFAULT_LISTEN_ADDR);

        let max_frame_bytes = lookup_u64(
            &lookup,
            "CHAT_SERVER_MAX_FRAME_BYTES",
            DEFAULT_MAX_FRAME_BYTES as u64,
        )?;
        let write_queue_depth = lookup_u64(
            &lookup,
            "CHAT_SERVER_WRITE_QUEUE_DEPTH",
            DEFAULT_WRITE_QUEUE_DEPTH as u64,
        )?;
        let read_timeout_secs = lookup_u64(&lookup, "CHAT_SERVER_READ_TIMEOUT_SECS", 0)?;
        let write_timeout_secs = lookup_u64(&lookup, "CHAT_SERVER_WRITE_TIMEOUT_SECS", 0)?;
        let idle_timeout_secs = lookup_u64(&lookup, "CHAT_SERVER_IDLE_TIMEOUT_SECS", 0)?;

        if max_frame_bytes == 0 {
            return Err(ChatError::config(
                "invalid CHAT_SERVER_MAX_FRAME_BYTES: must be positive",
            ));
        }
        if write_queue_depth == 0 {
            return Err(ChatError::config(
                "invalid CHAT_SERVER_WRITE_QUEUE_DEPTH: must be positive",
            ));
        }

        Ok(Self {
            listen_addr: normalize_listen_addr(&listen_addr),
            max_frame_bytes: max_frame_bytes as usize,
            write_queue_depth: write_queue_depth as usize,
            read_timeout_secs,
            write_timeout_secs,
            idle_timeout_secs,
        })
    }
}

/// A bare `:8080` means "all interfaces"; socket addresses need an
/// explicit host part.
fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        addr.to_string()
    }
}

fn lookup_string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn lookup_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    if value.is_empty() {
        return Ok(default);
    }

    value
        .parse::<u64>()
        .map_err(|err| ChatError::config(format!("invalid {}={:?}: {}", key, value, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.max_frame_bytes, 64 * 1024);
        assert_eq!(cfg.write_queue_depth, 128);
        assert_eq!(cfg.read_timeout_secs, 0);
        assert_eq!(cfg.write_timeout_secs, 0);
        assert_eq!(cfg.idle_timeout_secs, 0);
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CHAT_SERVER_ADDR", "127.0.0.1:9000"),
            ("CHAT_SERVER_MAX_FRAME_BYTES", "1024"),
            ("CHAT_SERVER_WRITE_QUEUE_DEPTH", "16"),
            ("CHAT_SERVER_READ_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.max_frame_bytes, 1024);
        assert_eq!(cfg.write_queue_depth, 16);
        assert_eq!(cfg.read_timeout_secs, 30);
    }

    #[test]
    fn test_bare_port_addr_is_normalized() {
        let cfg = Config::from_lookup(lookup_from(&[("CHAT_SERVER_ADDR", ":9001")])).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9001");
    }

    #[test]
    fn test_empty_value_falls_back_to_default() {
        let cfg =
            Config::from_lookup(lookup_from(&[("CHAT_SERVER_MAX_FRAME_BYTES", "")])).unwrap();
        assert_eq!(cfg.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn test_invalid_integer_is_an_error() {
        let result =
            Config::from_lookup(lookup_from(&[("CHAT_SERVER_WRITE_QUEUE_DEPTH", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_frame_limit_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("CHAT_SERVER_MAX_FRAME_BYTES", "0")]));
        assert!(result.is_err());
    }
}
