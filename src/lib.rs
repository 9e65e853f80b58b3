//! Prometheus exporter for remote TLS certificates.
//!
//! Targets are dialed over TCP (optionally through an HTTP CONNECT proxy),
//! the TLS handshake is completed and the presented chain is turned into
//! expiry, chain and key usage metrics.

pub mod cli;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod projector;
pub mod scrape;
pub mod server;
pub mod tls;
