//! Core types, configuration, and error handling for sentry-provision.
//!
//! This crate provides the shared foundation used by the Sentry client and
//! the command-line binary:
//! - [`ProvisionError`]: unified error type using `thiserror`
//! - [`ProvisionConfig`]: configuration layered from `.sentry-provision.toml`
//!   and the process environment
//! - [`NotificationTarget`]: where alert rules send their notifications
//! - Shared types: [`Environment`], [`DsnBundle`], [`OutputFormat`]
//! - [`template`]: `$NAME` substitution for DSN configuration templates

mod config;
mod error;
pub mod template;
mod types;

pub use config::{
    NotificationTarget, OutputConfig, ProvisionConfig, RuleConfig, SentryConfig, CONFIG_FILE_NAME,
};
pub use error::ProvisionError;
pub use types::{DsnBundle, Environment, OutputFormat};

/// A convenience `Result` type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
