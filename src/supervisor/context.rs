//! The process-wide Supervision Context (spec §3): a singleton created by
//! [`super::start`] and torn down by [`super::stop`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::rendezvous::RendezvousSemaphore;
use crate::role::Role;
use crate::task_engine::EngineStopper;

/// Singleton holding everything [`super::stop`] needs to tear supervision
/// down. `None` before the first `start` and after a completed `stop` —
/// `stop`'s `Option::take` gives it natural idempotence.
pub(super) static CONTEXT: Mutex<Option<Context>> = Mutex::new(None);

pub(super) struct Context {
    pub(super) role: Role,
    pub(super) log_path: PathBuf,
    pub(super) semaphore: Arc<RendezvousSemaphore>,
    pub(super) shutting_down: Arc<AtomicBool>,
    pub(super) stopper: EngineStopper,
    /// The task-engine thread, for the `User` role only — the `Watchdog`
    /// role runs its engine on the thread that called `start`, so there is
    /// nothing to join.
    pub(super) engine_thread: Option<JoinHandle<()>>,
}
