#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{
    config::{CliArgs, FanOut, ServerConfig},
    serve::run_server_with_incoming,
    service::StoreService,
    stats::{StatsSnapshot, StoreStats},
    vendor::{BidSource, GrpcVendorClient},
};
