//! Server internals for `bidrelay-server`.
//!
//! ## Structure
//!
//! - [`config`] - CLI and environment configuration.
//! - [`registry`] - the vendor registry file.
//! - [`vendor`] - outbound vendor calls and bid aggregation.
//! - [`lifecycle`] - call records, completions and the event loop.
//! - [`service`] - the `Store` gRPC service.
//! - [`serve`] - transport assembly and graceful shutdown.
//! - [`stats`] - in-process counters.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod lifecycle;
pub mod registry;
pub mod serve;
pub mod service;
pub mod stats;
pub mod telemetry;
pub mod vendor;
