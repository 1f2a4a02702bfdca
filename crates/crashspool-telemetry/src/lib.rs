//! Crashspool Telemetry - observability for the crash spool
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus counters and histograms for ingestion,
//!   upload outcomes and retention sweeps
//! - `MetricsServer`: HTTP server exposing `/metrics` for scraping and a
//!   `/healthz` liveness endpoint

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::MetricsServer;
