//! Supervisor Core (spec §4.3): wires counters, tasks, signals, fork/exec
//! and the rendezvous semaphore into the bilateral supervision protocol.
//!
//! Exposes exactly two entry points, [`start`] and [`stop`], matching
//! `examples/original_source/source/watchdog.c`'s `WDStart`/`WDStop`.
#![allow(unsafe_code)]

mod context;
mod tasks;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::unistd::{ForkResult, Pid, fork, getppid};

use crate::config::Config;
use crate::error::WatchdogError;
use crate::logger::{self, LogSeverity};
use crate::rendezvous::RendezvousSemaphore;
use crate::role::Role;
use crate::signals::{self, Counters};
use crate::task_engine::TaskEngine;

use context::{CONTEXT, Context};

/// Bring supervision up for the current process.
///
/// `argv` must be the process's own argument vector (`argv[0]` included) —
/// it is used both as the rendezvous semaphore's key path and as the exact
/// argument vector replayed into every future revival exec. It must be
/// non-empty.
///
/// On the very first call anywhere in the process lineage (no `WD_ON` in
/// the environment), this forks and execs the watchdog binary, becoming its
/// parent. On every later call — the watchdog's own first call, and every
/// call following a revival on either side — `WD_ON` is already set, and
/// this process instead posts to the rendezvous semaphore and records its
/// parent as the partner.
///
/// For `role: Role::Watchdog`, this call **blocks** the calling thread
/// running the task engine until [`stop`] is invoked. For `role:
/// Role::User`, the task engine runs on a spawned background thread and
/// this call returns immediately, after blocking `BEAT`/`STOP` delivery on
/// the calling thread.
///
/// A fatal setup failure (handler install, semaphore open, task
/// registration, fork, rendezvous, or thread spawn) never returns to the
/// caller: it logs `ERR`, removes the rendezvous semaphore if one was
/// already opened, and exits the process with the failure's code (spec
/// §7), matching the original's `ExitOnCondition`. The `Result` return
/// type exists for the narrow window before any of that can happen and
/// for callers that want a type to match against; in practice this
/// function either sets supervision up or does not return.
pub fn start(role: Role, argv: Vec<String>, config: Config) -> Result<(), WatchdogError> {
    assert!(!argv.is_empty(), "argv must include at least the program path");

    if let Err(err) = signals::install_handlers() {
        fail_setup(role, &config.log_path, None, err);
    }
    logger::append(role, LogSeverity::Info, "Handlers are set", &config.log_path);

    let key_path = PathBuf::from(&argv[0]);
    let semaphore = match RendezvousSemaphore::open(&key_path) {
        Ok(semaphore) => Arc::new(semaphore),
        Err(err) => fail_setup(role, &config.log_path, None, err),
    };
    let shutting_down = Arc::new(AtomicBool::new(false));
    let argv = Arc::new(argv);

    let mut engine = TaskEngine::new();
    if let Err(err) = engine.register(
        "send_beat",
        config.beat_interval,
        tasks::signal_task(role, config.log_path.clone()),
    ) {
        fail_setup(
            role,
            &config.log_path,
            Some(&semaphore),
            WatchdogError::TaskEngine { details: err.to_string() },
        );
    }
    if let Err(err) = engine.register(
        "check_beats",
        config.check_interval,
        tasks::check_beats_task(
            role,
            Arc::clone(&argv),
            config.clone(),
            Arc::clone(&semaphore),
            Arc::clone(&shutting_down),
        ),
    ) {
        fail_setup(
            role,
            &config.log_path,
            Some(&semaphore),
            WatchdogError::TaskEngine { details: err.to_string() },
        );
    }
    let stopper = engine.stopper();
    if let Err(err) = engine.register("check_stops", config.check_interval, tasks::check_stops_task(stopper.clone()))
    {
        fail_setup(
            role,
            &config.log_path,
            Some(&semaphore),
            WatchdogError::TaskEngine { details: err.to_string() },
        );
    }
    logger::append(role, LogSeverity::Info, "Scheduler is set", &config.log_path);

    if std::env::var_os("WD_ON").is_none() {
        // SAFETY: no other thread exists in this process yet — the task
        // engine thread (User role) is not spawned until after this point.
        unsafe { std::env::set_var("WD_ON", "1") };

        // SAFETY: the child branch immediately execs without allocating or
        // taking any lock.
        let forked = match unsafe { fork() } {
            Ok(forked) => forked,
            Err(err) => fail_setup(
                role,
                &config.log_path,
                Some(&semaphore),
                WatchdogError::Fork { details: err.to_string() },
            ),
        };
        match forked {
            ForkResult::Child => tasks::exec_or_exit(&config.watchdog_binary, &argv),
            ForkResult::Parent { child } => {
                signals::set_partner_pid(child);
                if let Err(err) = semaphore.wait() {
                    fail_setup(role, &config.log_path, Some(&semaphore), err);
                }
            }
        }
    } else {
        let partner = getppid();
        signals::set_partner_pid(partner);
        if let Err(err) = semaphore.post() {
            fail_setup(role, &config.log_path, Some(&semaphore), err);
        }
    }

    let context = Context {
        role,
        log_path: config.log_path.clone(),
        semaphore: Arc::clone(&semaphore),
        shutting_down: Arc::clone(&shutting_down),
        stopper: stopper.clone(),
        engine_thread: None,
    };

    match role {
        Role::Watchdog => {
            *CONTEXT.lock() = Some(context);
            engine.run();
            Ok(())
        }
        Role::User => {
            let handle = match std::thread::Builder::new()
                .name("watchdog-task-engine".to_string())
                .spawn(move || engine.run())
            {
                Ok(handle) => handle,
                Err(err) => fail_setup(
                    role,
                    &config.log_path,
                    Some(&semaphore),
                    WatchdogError::ThreadSpawn { details: err.to_string() },
                ),
            };
            if let Err(err) = signals::block_on_current_thread() {
                fail_setup(
                    role,
                    &config.log_path,
                    Some(&semaphore),
                    WatchdogError::SignalHandler { signal: "BEAT/STOP", details: err.to_string() },
                );
            }

            let mut context = context;
            context.engine_thread = Some(handle);
            *CONTEXT.lock() = Some(context);
            Ok(())
        }
    }
}

/// Log `ERR`, remove the rendezvous semaphore if one was already opened,
/// and exit with `err`'s code. Never returns.
fn fail_setup(role: Role, log_path: &Path, semaphore: Option<&RendezvousSemaphore>, err: WatchdogError) -> ! {
    logger::append(role, LogSeverity::Err, &format!("fatal setup error: {err}"), log_path);
    if let Some(semaphore) = semaphore {
        if let Err(remove_err) = semaphore.remove() {
            logger::append(
                role,
                LogSeverity::Err,
                &format!("failed to remove rendezvous semaphore during fatal cleanup: {remove_err}"),
                log_path,
            );
        }
    }
    std::process::exit(err.exit_code());
}

/// The PID this process currently considers its partner, if supervision
/// has rendezvoused at least once. `None` before the first `start`.
#[must_use]
pub fn partner_pid() -> Option<Pid> {
    signals::partner_pid()
}

/// Stop supervision: halt the local task engine, remove the rendezvous
/// semaphore, and negotiate shutdown with the partner over `STOP`.
///
/// Idempotent — a second call, or a call with no supervision running, is a
/// no-op. Blocks for up to `timeout` waiting for the partner to echo
/// `STOP`, then joins the task-engine thread (User role only; the Watchdog
/// role's engine runs on the same thread that called [`start`], which is
/// this one).
pub fn stop(timeout: Duration) {
    let Some(context) = CONTEXT.lock().take() else {
        return;
    };

    logger::append(context.role, LogSeverity::Info, "Stopping WatchDog", &context.log_path);

    context.shutting_down.store(true, Ordering::SeqCst);
    context.stopper.stop();

    if let Err(err) = context.semaphore.remove() {
        // A removal failure leaves the rendezvous in an inconsistent
        // state; treated as fatal via the same exit path as a setup
        // failure rather than logged-and-continued.
        logger::append(
            context.role,
            LogSeverity::Err,
            &format!("failed to remove rendezvous semaphore: {err}"),
            &context.log_path,
        );
        std::process::exit(err.exit_code());
    }

    if let Some(partner) = signals::partner_pid() {
        let deadline = Instant::now() + timeout;
        loop {
            let _ = signals::send_stop(partner);
            if Counters::stop_count() > 0 || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    if let Some(handle) = context.engine_thread {
        let _ = handle.join();
    }
}
