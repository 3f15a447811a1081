//! # Observability
//!
//! Prometheus metrics collection.

pub mod metrics;
