//! Append-only event log (spec §4.6).
//!
//! One line per event: `[HH:MM:SS] <role> | <severity> | <message>`.
//! Logging is best-effort — a failed open is swallowed rather than
//! propagated — and this module is never invoked from a signal handler
//! (spec §4.1, §5): handlers only touch atomics.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;

use crate::role::Role;

/// Event severity (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Info,
    Warn,
    Err,
}

impl LogSeverity {
    const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Err => "ERR",
        }
    }
}

/// Append one line to the event log at `path`.
///
/// A failure to open or write the file is silently dropped, matching the
/// spec's "logging is best-effort" rule — there is no caller in a position
/// to react to a logging failure.
pub fn append(role: Role, severity: LogSeverity, message: &str, path: &Path) {
    let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let timestamp = Local::now().format("%H:%M:%S");
    let _ = writeln!(file, "[{timestamp}] {role} | {} | {message}", severity.label());
}

#[cfg(test)]
mod tests {
    use super::{LogSeverity, append};
    use crate::role::Role;
    use std::fs;

    #[test]
    fn appends_a_well_formed_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logger.txt");

        append(Role::User, LogSeverity::Info, "hello", &path);

        let contents = fs::read_to_string(&path).expect("log file should exist");
        assert!(contents.contains("UserProc | INFO | hello"));
        assert!(contents.starts_with('['));
    }

    #[test]
    fn appends_are_cumulative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logger.txt");

        append(Role::Watchdog, LogSeverity::Warn, "first", &path);
        append(Role::Watchdog, LogSeverity::Err, "second", &path);

        let contents = fs::read_to_string(&path).expect("log file should exist");
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("WARN | first"));
        assert!(contents.contains("ERR | second"));
    }

    #[test]
    fn missing_parent_directory_is_swallowed() {
        // Best-effort: a write into a directory that doesn't exist must not panic.
        let path = std::path::Path::new("/nonexistent/deeply/nested/logger.txt");
        append(Role::User, LogSeverity::Info, "irrelevant", path);
    }
}
