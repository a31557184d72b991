use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        PipelineError::not_found("x")
            .to_string()
            .contains("shader not found:")
    );
    assert!(
        PipelineError::compile("x")
            .to_string()
            .contains("shader compile error:")
    );
    assert!(
        PipelineError::type_mismatch("x")
            .to_string()
            .contains("type mismatch:")
    );
    assert!(
        PipelineError::unknown_parameter("x")
            .to_string()
            .contains("unknown parameter:")
    );
    assert!(
        PipelineError::format_mismatch("x")
            .to_string()
            .contains("format mismatch:")
    );
    assert!(
        PipelineError::validation("x")
            .to_string()
            .contains("validation error:")
    );
}

#[test]
fn shader_resolution_keeps_source_chain() {
    let err = PipelineError::shader_resolution(
        "layer:water",
        "ripple",
        PipelineError::not_found("ripple"),
    );
    let msg = err.to_string();
    assert!(msg.contains("layer:water"));
    assert!(msg.contains("ripple"));

    let source = std::error::Error::source(&err).expect("source");
    assert!(source.to_string().contains("shader not found"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = PipelineError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
