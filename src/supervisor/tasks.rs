//! The three periodic tasks every supervised process runs (spec §4.4):
//! send `BEAT`, check received `BEAT`s and revive a dead partner, check
//! received `STOP`s and halt the local task engine.
#![allow(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::unistd::{ForkResult, Pid, fork};

use crate::config::Config;
use crate::logger::{self, LogSeverity};
use crate::rendezvous::RendezvousSemaphore;
use crate::role::Role;
use crate::signals::{self, Counters};
use crate::task_engine::EngineStopper;

/// A `BEAT` signal not authenticated as coming from the current partner is
/// never counted, so any non-zero tally means the partner is alive.
const MIN_RECEIVED: u32 = 1;

/// Build the `SignalTask`: send `BEAT` to the partner every `beat_interval`.
pub(super) fn signal_task(role: Role, log_path: PathBuf) -> impl FnMut() + Send + 'static {
    move || {
        let Some(partner) = signals::partner_pid() else {
            return;
        };
        match signals::send_beat(partner) {
            Ok(()) => logger::append(role, LogSeverity::Info, "BEAT sent", &log_path),
            Err(err) => logger::append(
                role,
                LogSeverity::Warn,
                &format!("failed to send BEAT to {partner}: {err}"),
                &log_path,
            ),
        }
    }
}

/// Build the `CheckSig1Task`: validate the `BEAT` tally and revive a dead
/// partner.
#[allow(clippy::too_many_arguments)]
pub(super) fn check_beats_task(
    role: Role,
    argv: Arc<Vec<String>>,
    config: Config,
    semaphore: Arc<RendezvousSemaphore>,
    shutting_down: Arc<AtomicBool>,
) -> impl FnMut() + Send + 'static {
    move || {
        let observed = Counters::drain_beats();
        let expected = config.expected_beats();

        if observed != expected {
            logger::append(
                role,
                LogSeverity::Warn,
                &format!("unexpected number of BEATs received: got {observed}, expected {expected}"),
                &config.log_path,
            );
        }

        if observed >= MIN_RECEIVED {
            return;
        }

        if shutting_down.load(Ordering::SeqCst) {
            logger::append(
                role,
                LogSeverity::Warn,
                "partner appears dead during shutdown; skipping revival",
                &config.log_path,
            );
            return;
        }

        logger::append(role, LogSeverity::Err, "reviving partner process", &config.log_path);

        let revival_path: PathBuf = if role == Role::Watchdog {
            PathBuf::from(&argv[0])
        } else {
            config.watchdog_binary.clone()
        };

        match revive(&revival_path, &argv) {
            Ok(child_pid) => {
                signals::set_partner_pid(child_pid);
                if let Err(err) = semaphore.wait() {
                    logger::append(
                        role,
                        LogSeverity::Err,
                        &format!("rendezvous after revival failed: {err}; stopping"),
                        &config.log_path,
                    );
                    process::exit(err.exit_code());
                }
            }
            Err(err) => {
                logger::append(
                    role,
                    LogSeverity::Err,
                    &format!("fork failed while reviving partner: {err}; stopping"),
                    &config.log_path,
                );
                process::exit(crate::error::WatchdogError::Fork { details: err.to_string() }.exit_code());
            }
        }
    }
}

/// Build the `CheckSig2Task`: stop the local task engine once the partner's
/// `STOP` has been observed.
pub(super) fn check_stops_task(stopper: EngineStopper) -> impl FnMut() + Send + 'static {
    move || {
        if Counters::stop_count() > 0 {
            stopper.stop();
        }
    }
}

/// Fork, `execv(path, argv)` in the child, and return the child's PID to the
/// parent. Used both for the very first watchdog spawn and for every later
/// revival — in both cases the re-exec carries the original user `argv`.
pub(super) fn revive(path: &Path, argv: &[String]) -> nix::Result<Pid> {
    // SAFETY: fork() is called with no heap allocation or locking between it
    // and the immediate exec_or_exit in the child branch below.
    match unsafe { fork() }? {
        ForkResult::Child => exec_or_exit(path, argv),
        ForkResult::Parent { child } => Ok(child),
    }
}

/// `execv(path, argv)`, never returning on success. On failure there is no
/// useful way for a freshly-forked child to report the error to its parent,
/// so it exits distinctly rather than running on as a duplicate parent.
pub(super) fn exec_or_exit(path: &Path, argv: &[String]) -> ! {
    use std::ffi::CString;

    let c_path = match CString::new(path.as_os_str().as_encoded_bytes()) {
        Ok(c_path) => c_path,
        Err(_) => process::exit(127),
    };
    let c_args: Vec<CString> = argv
        .iter()
        .filter_map(|arg| CString::new(arg.as_bytes()).ok())
        .collect();

    let _ = nix::unistd::execv(&c_path, &c_args);
    process::exit(127)
}
