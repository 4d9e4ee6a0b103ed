//! gRPC service implementation.
//!
//! - [`handler`] - gRPC service entry point ([`StoreService`]).

pub mod handler;

pub use handler::StoreService;
