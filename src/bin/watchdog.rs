//! The dedicated watchdog process. Built as `watchdog`, matching the
//! filename `supervisor::start` execs into on the very first spawn and
//! `config::DEFAULT_WATCHDOG_BINARY`.
//!
//! This binary does nothing on its own besides call into the library with
//! `Role::Watchdog` — all protocol logic lives in `mutual_watchdog`.

use std::time::Duration;

use mutual_watchdog::config::Config;
use mutual_watchdog::role::Role;
use mutual_watchdog::supervisor;

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let config = Config::load("watchdog.toml", Role::Watchdog);

    // `start` itself logs and exits on any fatal setup failure; this just
    // covers the narrow window before that, if it were ever reached.
    if let Err(err) = supervisor::start(Role::Watchdog, argv, config) {
        eprintln!("watchdog: fatal setup error: {err}");
        std::process::exit(err.exit_code());
    }

    // `start` blocks on this thread until the partner's `STOP` stops the
    // task engine; `stop` here just finishes the teardown it already began.
    supervisor::stop(Duration::ZERO);
}
