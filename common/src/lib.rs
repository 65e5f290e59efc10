//! Provides types and functions that are common to the acceptance test crates.
#![deny(missing_docs)]
#[cfg(feature = "telemetry")]
pub mod telemetry;
