/// Builds the gRPC client and server code for `store.proto` and `vendor.proto`
/// using `tonic-prost-build`.
///
/// Both definitions live in the `proto` directory. The `store` package is the
/// inbound service the relay exposes; the `vendor` package is the outbound
/// service every bidding vendor implements. The relay needs the server side
/// of the first and the client side of the second, but both sides are
/// generated so tests can stand up vendor doubles and store clients.
///
/// # Descriptor Set
///
/// A serialized `FileDescriptorSet` is written to
/// `$OUT_DIR/bidrelay_descriptor.bin` so the server can expose gRPC
/// reflection.
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// Generated code is accessible in Rust via:
///
/// ```rust
/// pub mod store {
///     tonic::include_proto!("store");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("bidrelay_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &["proto/store.proto", "proto/vendor.proto"],
            &["proto"],
        )
        .unwrap();
}
