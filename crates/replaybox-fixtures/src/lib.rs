//! Test utilities and fixtures for replaybox integration tests.
//!
//! This crate provides helpers that reduce boilerplate when writing tests for
//! replaybox. It includes:
//!
//! - [`ConfigBuilder`] - Fluent API for constructing harness configurations
//! - [`CaseFiles`] - Writes a program with its `.in` / `.out` fixtures
//! - [`temp_dir`] - Create unique temporary directories
//! - [`toy`] - A toy story interpreter, in-process and as the
//!   `replaybox-toy-vm` binary

// Test fixtures crate - relaxed lints for test utilities
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]
#![cfg_attr(test, allow(clippy::panic))]

pub mod builders;
pub mod helpers;
pub mod toy;

// Re-export commonly used items at crate root
pub use builders::ConfigBuilder;
pub use helpers::{temp_dir, write_config, CaseFiles};
