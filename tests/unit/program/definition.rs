use super::*;

const MANIFEST: &str = r#"{
  "programs": {
    "tint": {
      "source": "sample(input, uv) * Tint",
      "params": {
        "Tint": { "type": "vec4", "default": [1, 0.5, 0.5, 1] }
      }
    },
    "fade": {
      "source": "let c = sample(input, uv); vec4(c.rgb, c.a * Amount)",
      "params": {
        "Amount": { "type": "float", "default": 0.5, "min": 0, "max": 1 }
      }
    }
  }
}"#;

#[test]
fn manifest_round_trips_into_loadable_programs() {
    let lib = ProgramLibrary::from_json_str(MANIFEST).unwrap();
    assert_eq!(lib.len(), 2);

    let def = lib.lookup(&ShaderId::from("fade")).unwrap();
    let program = ShaderProgram::load(ShaderId::from("fade"), def, 1).unwrap();
    assert_eq!(program.generation(), 1);
    assert_eq!(
        program.defaults().get("Amount"),
        Some(&ParameterValue::Float(0.5))
    );
    assert_eq!(program.schema().get("Amount").unwrap().max, Some(1.0));
    assert!(!program.reads_previous());
}

#[test]
fn unknown_id_is_not_found() {
    let lib = ProgramLibrary::from_json_str(MANIFEST).unwrap();
    let err = lib.lookup(&ShaderId::from("nope")).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[test]
fn manifest_rejects_bad_defaults_and_unknown_fields() {
    let bad_default = r#"{"programs": {"p": {"source": "vec4(1)",
        "params": {"X": {"type": "vec2", "default": 3}}}}}"#;
    assert!(matches!(
        ProgramLibrary::from_json_str(bad_default),
        Err(PipelineError::Validation(_))
    ));

    let unknown = r#"{"programs": {"p": {"source": "vec4(1)", "colour": 1}}}"#;
    assert!(ProgramLibrary::from_json_str(unknown).is_err());
}

#[test]
fn invalid_bytes_and_bad_source_are_compile_errors() {
    let def = ProgramDefinition {
        bytecode: vec![0xff, 0xfe, 0x00],
        schema: ParamSchema::new(),
        defaults: BTreeMap::new(),
    };
    let err = ShaderProgram::load(ShaderId::from("bin"), def, 1).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(_)));

    let def = ProgramDefinition::from_source("vec4(1", ParamSchema::new());
    let err = ShaderProgram::load(ShaderId::from("syntax"), def, 1).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(_)));
}

#[test]
fn definition_defaults_overlay_schema_defaults() {
    let schema = ParamSchema::new()
        .with("Amount", ParamDecl::new(ParamType::Float).with_range(0.0, 1.0))
        .unwrap();
    let mut def = ProgramDefinition::from_source("sample(input, uv) * Amount", schema);
    def.defaults
        .insert("Amount".to_owned(), ParameterValue::Float(0.75));
    let program = ShaderProgram::load(ShaderId::from("p"), def.clone(), 1).unwrap();
    assert_eq!(
        program.defaults().get("Amount"),
        Some(&ParameterValue::Float(0.75))
    );

    def.defaults
        .insert("Amount".to_owned(), ParameterValue::Float(4.0));
    let err = ShaderProgram::load(ShaderId::from("p"), def, 1).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(_)));
}
