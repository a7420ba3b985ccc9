fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/auth.proto");

    // protox compiles the descriptors in-process, so no system protoc is
    // needed. Server codegen is kept for the in-process mock in tests.
    let file_descriptors = protox::compile(["proto/auth.proto"], ["proto"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(file_descriptors)?;

    Ok(())
}
