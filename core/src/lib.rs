//! Core types, request generation and scheduling for kubeload
//!
//! This crate provides the building blocks used by the `kubeload` binary:
//!
//! - Load-profile model (weighted-random and time-series execution modes)
//! - REST client pool and request builders for the Kubernetes API
//! - Executors that turn a profile into a stream of prepared requests
//! - The scheduler that drives a worker pool and records metrics

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod metrics;
pub mod profile;
pub mod request;
pub mod rest;
pub mod scheduler;

/// Commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::profile::{LoadProfile, LoadProfileSpec};
    pub use crate::scheduler::{schedule, RunResult};
}
