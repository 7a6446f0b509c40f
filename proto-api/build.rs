use std::{env, path::PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../proto/language.proto");
    println!("cargo:rerun-if-changed=../proto/plugin.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    // Both files share the `pulumirpc` package, so they land in one module.
    // google.protobuf.Empty maps onto `()`.
    let proto_files = ["../proto/language.proto", "../proto/plugin.proto"];
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("language_descriptor.bin"))
        .compile_protos(&proto_files, &["../proto"])?;
    Ok(())
}
