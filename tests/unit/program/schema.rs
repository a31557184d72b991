use super::*;
use crate::program::value::TextureRef;

fn schema() -> ParamSchema {
    ParamSchema::new()
        .with(
            "Intensity",
            ParamDecl::new(ParamType::Float)
                .with_default(ParameterValue::Float(0.5))
                .with_range(0.0, 1.0),
        )
        .unwrap()
        .with("Tint", ParamDecl::new(ParamType::Vec4))
        .unwrap()
        .with(SCREEN_SIZE, ParamDecl::new(ParamType::Vec2))
        .unwrap()
        .with("Noise", ParamDecl::new(ParamType::Texture))
        .unwrap()
}

#[test]
fn unknown_name_is_a_hard_error() {
    let err = schema()
        .validate("Intensty", &ParameterValue::Float(0.2))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownParameter(_)));
}

#[test]
fn tag_mismatch_is_rejected() {
    let err = schema()
        .validate("Tint", &ParameterValue::Vec3([1.0, 0.0, 0.0]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch(_)));
}

#[test]
fn bounds_apply_to_scalars() {
    let s = schema();
    assert!(s.validate("Intensity", &ParameterValue::Float(1.0)).is_ok());
    let err = s
        .validate("Intensity", &ParameterValue::Float(1.5))
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutOfRange(_)));
    let err = s
        .validate("Intensity", &ParameterValue::Float(f32::NAN))
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutOfRange(_)));
}

#[test]
fn textures_have_no_default_and_accept_refs() {
    let s = schema();
    assert_eq!(s.get("Noise").unwrap().default, None);
    assert!(
        s.validate("Noise", &ParameterValue::Texture(TextureRef::new("noise")))
            .is_ok()
    );
}

#[test]
fn reserved_declarations_must_use_their_fixed_types() {
    let err = ParamSchema::new()
        .with(SCREEN_SIZE, ParamDecl::new(ParamType::Vec3))
        .unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch(_)));
    assert!(is_reserved(SCREEN_SIZE));
    assert!(is_reserved(MATRIX_TRANSFORM));
    assert!(!is_reserved("Intensity"));
}

#[test]
fn inconsistent_declarations_are_rejected() {
    let err = ParamSchema::new()
        .with("x", ParamDecl::new(ParamType::Float).with_range(2.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = ParamSchema::new()
        .with(
            "x",
            ParamDecl::new(ParamType::Float).with_default(ParameterValue::Bool(true)),
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch(_)));
}
