//! gRPC service and message definitions generated from `proto/*.proto`.
//!
//! ## Services
//!
//! - [`store::store_server::Store`] - `getProducts`, the inbound lookup that
//!   the relay answers with one [`store::ProductInfo`] per successful vendor.
//! - [`vendor::vendor_client::VendorClient`] - `getProductBid`, the outbound
//!   call issued once per registered vendor endpoint.

/// Inbound `store` package.
pub mod store {
    tonic::include_proto!("store");
}

/// Outbound `vendor` package.
pub mod vendor {
    tonic::include_proto!("vendor");
}

/// Encoded descriptor set for both packages, used by gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("bidrelay_descriptor");
