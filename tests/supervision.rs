//! Multi-process integration tests for the supervision protocol.
//!
//! Each scenario forks a real child process to run the library in (the
//! library's state is process-global `'static` data, so two scenarios can
//! never safely share a process), then asserts on the resulting
//! `logger.txt` and on process liveness — the same style used by the
//! corpus's own process-guard tests (fork, signal, `waitpid`, inspect
//! `/proc`).

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use mutual_watchdog::config::Config;
use mutual_watchdog::role::Role;
use mutual_watchdog::supervisor;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork};

/// Path to the compiled watchdog binary, provided by Cargo for every
/// integration test in terms of its `[[bin]]` target name.
fn watchdog_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_watchdog"))
}

fn process_is_alive(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

fn fast_config(log_path: PathBuf) -> Config {
    Config {
        beat_interval: Duration::from_millis(100),
        check_interval: Duration::from_millis(500),
        watchdog_binary: watchdog_binary(),
        log_path,
    }
}

/// Scenario 1 (spec §8): happy path — both processes come up, exchange
/// heartbeats, and shut down cleanly on request.
#[test]
fn happy_path_exchanges_beats_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("logger.txt");
    let key_path = dir.path().join("user-key");
    fs::write(&key_path, b"key").expect("write key file");

    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let argv = vec![key_path.display().to_string()];
            let config = fast_config(log_path.clone());
            supervisor::start(Role::User, argv, config).expect("start");
            std::thread::sleep(Duration::from_millis(800));
            supervisor::stop(Duration::from_secs(2));
            std::process::exit(0);
        }
        ForkResult::Parent { child } => {
            let _ = waitpid(child, None);
        }
    }

    let contents = fs::read_to_string(&log_path).expect("log file should exist");
    assert!(contents.contains("Handlers are set"));
    assert!(contents.contains("Scheduler is set"));
    assert!(contents.contains("BEAT sent"));
    assert!(contents.contains("Stopping WatchDog"));
}

/// Scenario 3 (spec §8): the watchdog is killed outright; the user process
/// notices the missing heartbeats and revives it.
#[test]
fn user_process_revives_a_killed_watchdog() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("logger.txt");
    let key_path = dir.path().join("user-key");
    let watchdog_pid_path = dir.path().join("watchdog.pid");
    fs::write(&key_path, b"key").expect("write key file");

    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let argv = vec![key_path.display().to_string()];
            // A short check interval so a killed watchdog is noticed well
            // within this test's patience.
            let config = Config {
                beat_interval: Duration::from_millis(100),
                check_interval: Duration::from_millis(400),
                watchdog_binary: watchdog_binary(),
                log_path: log_path.clone(),
            };
            supervisor::start(Role::User, argv, config).expect("start");

            // Publish the partner PID as it changes so the parent (which
            // has no direct view into this process's state) can observe
            // both the original watchdog and its replacement after revival.
            // Written via a rename so the parent never observes a
            // truncated, half-written file.
            let watchdog_pid_path = watchdog_pid_path.clone();
            std::thread::spawn(move || {
                let tmp_path = watchdog_pid_path.with_extension("pid.tmp");
                loop {
                    if let Some(pid) = supervisor::partner_pid() {
                        if fs::write(&tmp_path, pid.as_raw().to_string()).is_ok() {
                            let _ = fs::rename(&tmp_path, &watchdog_pid_path);
                        }
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            });

            std::thread::sleep(Duration::from_secs(4));
            supervisor::stop(Duration::from_secs(2));
            std::process::exit(0);
        }
        ForkResult::Parent { child } => {
            let published = wait_until(|| try_read_published_pid(&watchdog_pid_path).is_some(), Duration::from_secs(2));
            assert!(published, "user process should publish the watchdog's pid after rendezvous");

            let original_pid = try_read_published_pid(&watchdog_pid_path).expect("pid was just confirmed published");
            assert!(process_is_alive(original_pid), "watchdog should be alive before it is killed");

            kill(original_pid, Signal::SIGKILL).expect("kill watchdog");

            let revived = wait_until(
                || {
                    try_read_published_pid(&watchdog_pid_path)
                        .is_some_and(|current| current != original_pid && process_is_alive(current))
                },
                Duration::from_secs(3),
            );
            assert!(revived, "a new, live watchdog pid should replace the killed one");

            let _ = waitpid(child, None);
        }
    }

    let contents = fs::read_to_string(&log_path).expect("log file should exist");
    assert!(contents.contains("reviving partner process"), "expected a revival log line, got:\n{contents}");
}

/// Best-effort read of the published watchdog pid. `None` covers both "not
/// published yet" and any transient read error — callers poll via
/// `wait_until` rather than treating either as fatal.
fn try_read_published_pid(path: &PathBuf) -> Option<Pid> {
    let raw: i32 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
    Some(Pid::from_raw(raw))
}

/// Scenario 5 (spec §8): calling `stop` twice must be a no-op the second
/// time, not a double-teardown.
#[test]
fn stop_is_idempotent_within_one_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("logger.txt");
    let key_path = dir.path().join("user-key");
    fs::write(&key_path, b"key").expect("write key file");

    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let argv = vec![key_path.display().to_string()];
            let config = fast_config(log_path.clone());
            supervisor::start(Role::User, argv, config).expect("start");
            std::thread::sleep(Duration::from_millis(300));
            supervisor::stop(Duration::from_secs(1));
            supervisor::stop(Duration::from_secs(1));
            std::process::exit(0);
        }
        ForkResult::Parent { child } => {
            let exited_cleanly = wait_until(|| !process_is_alive(child), Duration::from_secs(5));
            assert!(exited_cleanly, "child should exit on its own after two stop() calls");
            let _ = waitpid(child, None);
        }
    }

    let contents = fs::read_to_string(&log_path).expect("log file should exist");
    assert_eq!(contents.matches("Stopping WatchDog").count(), 1);
}
