use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ReelError::automation("x")
            .to_string()
            .contains("automation error:")
    );
    assert!(ReelError::render("x").to_string().contains("render error:"));
    assert!(
        ReelError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let err = ReelError::Other(anyhow::anyhow!("decoder went away"));
    assert!(err.to_string().contains("decoder went away"));
}

#[test]
fn io_errors_map_to_serde() {
    let err: ReelError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
    assert!(matches!(err, ReelError::Serde(_)));
}
