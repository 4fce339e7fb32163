//! # sv-protocol
//!
//! Core protocol definitions and data models for scriptvisor.
//!
//! This crate defines all shared data structures used for:
//! - Durable process records and their lifecycle status
//! - Script sources handed to the supervisor by the access layer
//! - Output stream events and structured errors returned to callers
//! - Supervisor configuration parsed from `config.toml`
//!
//! ## Modules
//!
//! - [`process_models`]: Process records and status
//! - [`script_models`]: Script types and resolved script sources
//! - [`ipc`]: Stream events and error bodies sent to callers
//! - [`config_models`]: Supervisor settings and launch strategies
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, thiserror, chrono and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other scriptvisor crates

pub mod config_models;
pub mod ipc;
pub mod process_models;
pub mod script_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use process_models::*;
pub use script_models::*;
