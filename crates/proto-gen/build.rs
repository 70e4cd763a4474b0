// Build script to generate the Bastion gRPC service stubs.
//
// Services are described in Rust with tonic-build's manual builder, so the
// build does not depend on `protoc` being installed. Message types live in
// `src/lib.rs` as prost derives and are referenced via `super::`.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";
const PACKAGE: &str = "bastion";

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(input)
        .output_type(output)
        .codec_path(CODEC)
        .build()
}

fn server_streaming(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(input)
        .output_type(output)
        .codec_path(CODEC)
        .server_streaming()
        .build()
}

fn main() {
    let biz = Service::builder()
        .name("Biz")
        .package(PACKAGE)
        .method(unary("check", "Check", "super::Nothing", "super::Nothing"))
        .method(unary("add", "Add", "super::Nothing", "super::Nothing"))
        .method(unary("test", "Test", "super::Nothing", "super::Nothing"))
        .build();

    let admin = Service::builder()
        .name("Admin")
        .package(PACKAGE)
        .method(server_streaming(
            "logging",
            "Logging",
            "super::Nothing",
            "super::Event",
        ))
        .method(server_streaming(
            "statistics",
            "Statistics",
            "super::StatInterval",
            "super::Stat",
        ))
        .build();

    Builder::new().compile(&[biz, admin]);

    println!("cargo:rerun-if-changed=build.rs");
}
