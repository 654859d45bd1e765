//! The two roles a supervised process can take (spec §3, §4.5).

use std::fmt;

/// Which half of the mutual-supervision pair this process is playing.
///
/// Fixed for the lifetime of a [`crate::supervisor`] context. Passed
/// explicitly into [`crate::supervisor::start`] by each binary's `main`
/// rather than read from a global flag, per the design note in the
/// specification: the watchdog binary's `main` supplies `Role::Watchdog`,
/// every other caller supplies `Role::User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The host application process.
    User,
    /// The dedicated watchdog process, spawned via exec of the watchdog
    /// binary.
    Watchdog,
}

impl Role {
    /// The log identifier used in `logger.txt` lines for this role.
    #[must_use]
    pub const fn log_identifier(self) -> &'static str {
        match self {
            Self::User => "UserProc",
            Self::Watchdog => "WatchDog",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn log_identifiers_match_spec() {
        assert_eq!(Role::User.log_identifier(), "UserProc");
        assert_eq!(Role::Watchdog.log_identifier(), "WatchDog");
    }

    #[test]
    fn display_matches_log_identifier() {
        assert_eq!(Role::User.to_string(), "UserProc");
        assert_eq!(Role::Watchdog.to_string(), "WatchDog");
    }
}
