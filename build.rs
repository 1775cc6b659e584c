//! Build script for kiln-converter
//!
//! Generates Rust code from the wire-format protobuf definitions using
//! prost-build: the exported source format (`flat.proto`) consumed by the
//! flat frontend, and the runtime model format (`model.proto`) produced by
//! the serializer.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = [
        PathBuf::from("proto/flat.proto"),
        PathBuf::from("proto/model.proto"),
    ];

    for proto in &protos {
        if !proto.exists() {
            return Err(format!(
                "Wire-format proto file not found at: {}\n\
                 The proto/ directory must ship with the crate sources.",
                proto.display()
            )
            .into());
        }
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    // Source a `protoc` binary. Prefer one already on the system (via PROTOC or
    // PATH); otherwise fall back to the vendored binary so the build is
    // self-contained in environments without protobuf-compiler installed.
    if env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            env::set_var("PROTOC", protoc);
        }
    }

    let mut config = prost_build::Config::new();

    // Deterministic ordering for generated map fields
    config.btree_map(["."]);
    config.out_dir(&out_dir);

    config.compile_protos(&protos, &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/flat.proto");
    println!("cargo:rerun-if-changed=proto/model.proto");
    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
