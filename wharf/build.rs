use std::io::Result;

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=proto/tlc.proto");
    println!("cargo:rerun-if-changed=proto/pwr.proto");
    println!("cargo:rerun-if-changed=proto/bsdiff.proto");

    prost_build::Config::new().compile_protos(
        &["proto/tlc.proto", "proto/pwr.proto", "proto/bsdiff.proto"],
        &["proto/"],
    )?;

    Ok(())
}
