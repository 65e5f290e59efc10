//! Provides Kubernetes fixtures for acceptance testing apps on a live cluster.
#![warn(missing_docs)]

/// App module for app platform resources and installation.
pub mod app;
/// Cluster module wrapping the kube client.
pub mod cluster;
/// Error module shared by all fixtures.
pub mod error;
/// Labels module for building label selectors.
pub mod labels;
/// Namespace module for namespace fixtures.
pub mod namespace;
/// Readiness module describing when resources count as running.
pub mod readiness;
/// Secret module for idempotent secret fixtures.
pub mod secret;
/// Utils module for shared helper functions.
pub mod utils;
/// Wait module for polling resources until ready.
pub mod wait;

pub use cluster::Cluster;
pub use error::Error;

/// Field manager recorded on every object created by the harness.
const FIELD_MANAGER: &str = "olly-ats";
