//! A translation of the original `user_app.c` demo: fork a child that
//! starts supervision and runs for a while, have the parent kill it to
//! demonstrate revival, then have the revived process kill its own
//! watchdog to demonstrate revival in the other direction.
//!
//! Run with `cargo run --example user_app`.

use std::time::Duration;

use mutual_watchdog::config::Config;
use mutual_watchdog::role::Role;
use mutual_watchdog::supervisor;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, fork, getppid};

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    test_watchdog(&argv);
}

fn test_watchdog(argv: &[String]) {
    if std::env::var_os("WD_ON").is_none() {
        // SAFETY: no other thread exists in this process yet.
        match unsafe { fork() }.expect("fork failed") {
            ForkResult::Child => {
                println!(" ~ User App running ~");
                std::thread::sleep(Duration::from_secs(1));
                start_or_exit(argv);
                dream_sleep(10);
                supervisor::stop(Duration::from_secs(5));
                std::thread::sleep(Duration::from_secs(2));
                println!("Finished, kill did not take place");
            }
            ForkResult::Parent { child } => {
                std::thread::sleep(Duration::from_secs(5));
                println!(" ~ User app killed ~");
                let _ = kill(child, Signal::SIGKILL);
                let _ = waitpid(child, None);
            }
        }
    } else {
        println!("\n ~ User app revived by WD ~");
        start_or_exit(argv);
        std::thread::sleep(Duration::from_secs(3));
        println!(" ~ WD process killed ~");
        let _ = kill(getppid(), Signal::SIGINT);
        std::thread::sleep(Duration::from_secs(10));
        println!(" ~ WD process revived by User app ~");
        supervisor::stop(Duration::from_secs(5));
        std::thread::sleep(Duration::from_secs(2));
        println!(" ~ User app finished executing ~");
    }
}

fn start_or_exit(argv: &[String]) {
    let config = Config::load("watchdog.toml", Role::User);
    // `start` itself logs and exits on any fatal setup failure; this just
    // covers the narrow window before that, if it were ever reached.
    if let Err(err) = supervisor::start(Role::User, argv.to_vec(), config) {
        eprintln!("user_app: fatal setup error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn dream_sleep(seconds: u64) {
    for tick in 0..seconds {
        println!("in loop, {tick}");
        std::thread::sleep(Duration::from_secs(1));
    }
}
