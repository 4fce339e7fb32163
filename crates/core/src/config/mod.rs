//! Configuration loading and management.
//!
//! This module loads the supervisor settings from the `.scriptvisor/`
//! directory and validates them before they reach the launcher.

pub mod error;
pub mod loader;
