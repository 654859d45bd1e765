//! Periodic Task Engine (spec §4.4): a single cooperative loop that runs
//! named callbacks at fixed whole-second intervals, stoppable promptly from
//! another thread.
//!
//! Out of scope for this crate's domain logic (spec §1) — this module knows
//! nothing about supervision, only about running closures on a schedule.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use thiserror::Error;

/// Failure registering a task with the engine.
#[derive(Debug, Error)]
pub enum TaskEngineError {
    /// Two tasks were registered under the same name, violating the
    /// one-`BEAT`-task / one-checker-task invariant (spec §3).
    #[error("duplicate task name: {0}")]
    DuplicateTaskName(String),
}

struct ScheduledTask {
    name: String,
    interval: Duration,
    next_run: Instant,
    action: Box<dyn FnMut() + Send>,
}

/// A single-threaded, cooperative scheduler of named periodic callbacks.
pub struct TaskEngine {
    tasks: Vec<ScheduledTask>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

/// A handle that can stop a running [`TaskEngine`] from another thread.
#[derive(Clone)]
pub struct EngineStopper {
    stop_tx: Sender<()>,
}

impl EngineStopper {
    /// Signal the engine to stop. Safe to call more than once; extra calls
    /// after the engine has already exited are no-ops.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

impl Default for TaskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskEngine {
    #[must_use]
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            tasks: Vec::new(),
            stop_tx,
            stop_rx,
        }
    }

    /// A handle that can stop this engine's `run` loop from another thread.
    #[must_use]
    pub fn stopper(&self) -> EngineStopper {
        EngineStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Register a task to run every `interval`, starting one `interval`
    /// from now.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        action: impl FnMut() + Send + 'static,
    ) -> Result<(), TaskEngineError> {
        let name = name.into();
        if self.tasks.iter().any(|task| task.name == name) {
            return Err(TaskEngineError::DuplicateTaskName(name));
        }
        self.tasks.push(ScheduledTask {
            next_run: Instant::now() + interval,
            name,
            interval,
            action: Box::new(action),
        });
        Ok(())
    }

    /// Run the scheduler loop on the calling thread until stopped.
    ///
    /// Wakes on whichever comes first: the next task's due time, or a stop
    /// notice on the control channel — so `stop` is honored promptly
    /// instead of waiting out the current tick.
    pub fn run(&mut self) {
        loop {
            let now = Instant::now();
            let next_due = self.tasks.iter().map(|task| task.next_run).min();

            let wait_for = match next_due {
                Some(due) if due > now => due - now,
                Some(_) => Duration::ZERO,
                None => {
                    // No tasks registered; still honor stop promptly.
                    if self.stop_rx.recv().is_ok() {
                        return;
                    }
                    return;
                }
            };

            match self.stop_rx.recv_timeout(wait_for) {
                Ok(()) => return,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
            }

            let now = Instant::now();
            for task in &mut self.tasks {
                if task.next_run <= now {
                    (task.action)();
                    task.next_run = now + task.interval;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskEngine;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn duplicate_task_name_is_rejected() {
        let mut engine = TaskEngine::new();
        engine
            .register("a", Duration::from_millis(10), || {})
            .expect("first registration");
        let err = engine
            .register("a", Duration::from_millis(10), || {})
            .expect_err("duplicate should be rejected");
        assert!(matches!(
            err,
            super::TaskEngineError::DuplicateTaskName(name) if name == "a"
        ));
    }

    #[test]
    fn stop_returns_promptly_even_with_a_long_interval() {
        let mut engine = TaskEngine::new();
        engine
            .register("slow", Duration::from_secs(3600), || {})
            .expect("register");
        let stopper = engine.stopper();

        let handle = std::thread::spawn(move || engine.run());
        std::thread::sleep(Duration::from_millis(20));
        stopper.stop();

        handle.join().expect("engine thread should exit promptly");
    }

    #[test]
    fn tasks_run_on_their_interval() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_in_task = Arc::clone(&counter);

        let mut engine = TaskEngine::new();
        engine
            .register("tick", Duration::from_millis(10), move || {
                counter_in_task.fetch_add(1, Ordering::SeqCst);
            })
            .expect("register");
        let stopper = engine.stopper();

        let handle = std::thread::spawn(move || engine.run());
        std::thread::sleep(Duration::from_millis(55));
        stopper.stop();
        handle.join().expect("join");

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
