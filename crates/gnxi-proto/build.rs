fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_client(false)
        .compile(
            &[
                "proto/gnmi/gnmi.proto",
                "proto/gnoi/system.proto",
                "proto/gnoi/cert.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
