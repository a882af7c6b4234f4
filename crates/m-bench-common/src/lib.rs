//! ---
//! mb_section: "01-core-functionality"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Shared primitives and utilities for the bench runtime."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Core shared primitives for the M-BENCH workspace.
//! This crate exposes configuration loading, logging bootstrap, and time
//! helpers consumed across the workspace.

#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    BufferConfig, EngineConfig, LoggingConfig, ReplayConfig, ScriptConfig, TestCaseConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::monotonic_now;
