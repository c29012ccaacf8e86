//! Sentry REST API client and provisioning workflow.
//!
//! Provides the bearer-authenticated, pagination-aware API client, the API
//! entity types, the alert rule payload builder, and the [`Provisioner`]
//! that sequences project, key and rule calls for the CLI.

pub mod client;
pub mod model;
pub mod provision;
pub mod rules;

pub use client::SentryClient;
pub use provision::Provisioner;
