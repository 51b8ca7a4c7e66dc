use std::path::PathBuf;

use prost::Message;

const PROTO: &str = "proto/bpfrecorder.proto";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={}", PROTO);

    // protox parses the schema in-process so builds do not need a system protoc.
    let descriptors = protox::compile([PROTO], ["proto"])?;
    let descriptor_path = PathBuf::from(std::env::var("OUT_DIR")?).join("bpfrecorder_descriptor.bin");
    std::fs::write(&descriptor_path, descriptors.encode_to_vec())?;

    tonic_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .skip_protoc_run()
        .compile_protos(&[PROTO], &["proto"])?;

    Ok(())
}
