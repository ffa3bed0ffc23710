//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Pool runtime orchestration
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod runtime;
