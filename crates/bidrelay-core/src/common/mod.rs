//! Shared protocol bindings, error type and domain types.
//!
//! - [`proto`] - Generated `store` and `vendor` gRPC bindings.
//! - [`error`] - The service-wide [`Error`] and its `tonic::Status` mapping.
//! - [`types`] - [`Bid`] and [`VendorEndpoint`].

pub mod error;
pub mod proto;
pub mod types;

pub use error::{Error, Result};
pub use types::{Bid, VendorEndpoint};
