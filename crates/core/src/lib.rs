//! # sv-core
//!
//! Script execution supervisor for scriptvisor.
//!
//! This crate takes a stored script, launches it as an OS child process,
//! tracks its lifecycle, streams its output to a caller in real time and
//! supports cooperative or forced cancellation.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `.scriptvisor/config.toml`
//! - [`launcher`]: Scratch-directory materialization and process construction
//! - [`registry`]: Live execution handles keyed by process id
//! - [`supervisor`]: Admission, start, terminal transitions and stop handling
//! - [`relay`]: Output readers and the per-stream consumer loop
//! - [`store`]: Process record persistence
//! - [`access`]: Script resolution and ownership checks
//! - [`signal`]: SIGTERM/SIGKILL escalation and liveness checks
//! - [`sse`]: Server-sent-events framing of stream events

pub mod access;
pub mod config;
pub mod error;
pub mod launcher;
pub mod registry;
pub mod relay;
pub mod signal;
pub mod sse;
pub mod store;
pub mod supervisor;

pub use error::{SupervisorError, SupervisorResult};
pub use supervisor::Supervisor;
