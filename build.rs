fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .field_attribute(
            ".catalog.v1.Device.updated_at",
            "#[serde(default, with = \"crate::serializer::timestamp\")]",
        )
        .compile_protos(&["proto/catalog.proto"], &["proto"])?;
    Ok(())
}
