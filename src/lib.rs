//! Mutual-supervision watchdog: two cooperating processes — a host
//! application and a dedicated watchdog — that heartbeat one another over
//! signals, revive each other via fork/exec when a heartbeat stops arriving,
//! and negotiate a clean shutdown on request.
//!
//! The library exposes exactly two entry points: [`supervisor::start`] and
//! [`supervisor::stop`]. Everything else is plumbing in service of those
//! two calls — the [`config`] an operator may tune, the [`error`] taxonomy
//! for the narrow set of fatal setup failures, and the append-only
//! [`logger`].

pub mod config;
pub mod error;
pub mod logger;
mod rendezvous;
pub mod role;
mod signals;
pub mod supervisor;
mod task_engine;
