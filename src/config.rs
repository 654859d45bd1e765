//! Tunable intervals and paths (spec §3, §8 of `SPEC_FULL.md`).
//!
//! A best-effort overlay on top of built-in defaults: a missing
//! `watchdog.toml` is the common case and is silent, a malformed one is
//! logged as a `WARN` and otherwise ignored. There is no fatal error path
//! here — config is never on the exit-code taxonomy in [`crate::error`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::logger::{self, LogSeverity};
use crate::role::Role;

/// Seconds between successive `BEAT` signals sent to the partner.
pub const DEFAULT_BEAT_INTERVAL_SECS: u64 = 1;
/// Seconds between successive heartbeat-counter checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;
/// Filename the watchdog binary is revived under, matching the `[[bin]]`
/// name in `Cargo.toml`.
pub const DEFAULT_WATCHDOG_BINARY: &str = "./watchdog";
/// Default event-log path.
pub const DEFAULT_LOG_PATH: &str = "logger.txt";

/// Resolved configuration for a supervision [`crate::supervisor::Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub beat_interval: Duration,
    pub check_interval: Duration,
    pub watchdog_binary: PathBuf,
    pub log_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            beat_interval: Duration::from_secs(DEFAULT_BEAT_INTERVAL_SECS),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            watchdog_binary: PathBuf::from(DEFAULT_WATCHDOG_BINARY),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

/// Optional overlay parsed from `watchdog.toml`. Every field is optional so
/// a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    beat_interval_secs: Option<u64>,
    check_interval_secs: Option<u64>,
    watchdog_binary: Option<PathBuf>,
    log_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, falling back to built-in defaults.
    ///
    /// A missing file is silent. A file that exists but fails to parse is
    /// logged at `WARN` (to the *default* log path, since the config that
    /// would name a different one never loaded) and defaults are used for
    /// every field.
    #[must_use]
    pub fn load(path: impl AsRef<Path>, role: Role) -> Self {
        let path = path.as_ref();
        let defaults = Self::default();

        let raw_text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return defaults,
        };

        let raw: RawConfig = match toml::from_str(&raw_text) {
            Ok(raw) => raw,
            Err(err) => {
                logger::append(
                    role,
                    LogSeverity::Warn,
                    &format!("failed to parse {}: {err}; using defaults", path.display()),
                    &defaults.log_path,
                );
                return defaults;
            }
        };

        Self {
            beat_interval: raw
                .beat_interval_secs
                .map_or(defaults.beat_interval, Duration::from_secs),
            check_interval: raw
                .check_interval_secs
                .map_or(defaults.check_interval, Duration::from_secs),
            watchdog_binary: raw.watchdog_binary.unwrap_or(defaults.watchdog_binary),
            log_path: raw.log_path.unwrap_or(defaults.log_path),
        }
    }

    /// Number of `BEAT` signals expected to arrive during one
    /// `check_interval` window, matching the original's
    /// `EXPECTED_SIGNALS = CHECK_INTERVAL / SEND_INTERVAL`.
    #[must_use]
    pub fn expected_beats(&self) -> u32 {
        let beat_secs = self.beat_interval.as_secs().max(1);
        (self.check_interval.as_secs() / beat_secs) as u32
    }
}
