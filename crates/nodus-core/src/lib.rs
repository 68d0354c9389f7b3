//! # nodus-core
//!
//! Core configuration, errors, and utilities for the Nodus bot.
//!
//! This crate provides shared functionality used across all Nodus crates:
//!
//! - **Configuration**: Loading, environment overrides, and validation
//! - **Reconnect policy**: The retry schedule shared by both long-lived sessions
//! - **Utilities**: Path resolution, environment handling, secret strings

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod retry;
pub mod secret;

// Re-exports for convenience
pub use config::Config;
pub use error::ConfigError;
pub use retry::{Backoff, ReconnectPolicy};
pub use secret::SecretString;
