//! Common test utilities for supervisor integration tests.
//!
//! - Fixtures: a supervisor wired to in-memory collaborators and shell
//!   script payloads
//! - Custom assertions over stream events and records
//! - Tracing and timeout helpers

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
