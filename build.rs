fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(false)
        .compile(&["proto/grpc_predict_v2.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/grpc_predict_v2.proto");
    Ok(())
}
