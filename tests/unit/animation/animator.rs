use super::*;
use std::sync::Arc;

use crate::animation::ease::Ease;
use crate::animation::timeline::Keyframe;
use crate::program::definition::{ProgramDefinition, ShaderProgram};
use crate::program::schema::{ParamDecl, ParamSchema, SCREEN_SIZE};
use crate::program::value::{ParamType, ParameterValue};

fn program() -> ProgramHandle {
    let schema = ParamSchema::new()
        .with(
            "Amount",
            ParamDecl::new(ParamType::Float)
                .with_default(ParameterValue::Float(0.0))
                .with_range(0.0, 1.0),
        )
        .unwrap()
        .with("Tint", ParamDecl::new(ParamType::Vec4))
        .unwrap()
        .with(SCREEN_SIZE, ParamDecl::new(ParamType::Vec2))
        .unwrap();
    let def = ProgramDefinition::from_source(
        "let c = sample(input, uv); c * Tint * Amount + vec4(ScreenSize.x * 0)",
        schema,
    );
    Arc::new(ShaderProgram::load(ShaderId::from("pulse"), def, 1).unwrap())
}

fn ramp(looping: bool) -> Timeline {
    Timeline::new(
        vec![
            Keyframe::new(0.0, ParameterValue::Float(0.0)),
            Keyframe::new(1.0, ParameterValue::Float(1.0)).with_ease(Ease::Linear),
        ],
        looping,
    )
    .unwrap()
}

fn amount(store: &ParameterStore, target: &TargetId) -> Option<ParameterValue> {
    store
        .get(target, &ShaderId::from("pulse"), "Amount")
        .cloned()
}

#[test]
fn start_validates_against_the_schema() {
    let p = program();
    let mut anim = ParameterAnimator::new();
    let t = TargetId::layer("ground");

    let err = anim.start(&t, &p, "Amont", ramp(false)).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownParameter(_)));

    let err = anim.start(&t, &p, "Tint", ramp(false)).unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch(_)));

    let size = Timeline::new(
        vec![Keyframe::new(0.0, ParameterValue::Vec2([1.0, 1.0]))],
        false,
    )
    .unwrap();
    let err = anim.start(&t, &p, SCREEN_SIZE, size).unwrap_err();
    assert!(matches!(err, PipelineError::Animation(_)));

    let too_far = Timeline::new(
        vec![
            Keyframe::new(0.0, ParameterValue::Float(0.0)),
            Keyframe::new(1.0, ParameterValue::Float(4.0)),
        ],
        false,
    )
    .unwrap();
    let err = anim.start(&t, &p, "Amount", too_far).unwrap_err();
    assert!(matches!(err, PipelineError::OutOfRange(_)));
    assert!(anim.is_empty());
}

#[test]
fn plays_then_finishes_holding_the_last_value() {
    let p = program();
    let t = TargetId::layer("ground");
    let mut anim = ParameterAnimator::new();
    let mut store = ParameterStore::new();

    let id = anim.start(&t, &p, "Amount", ramp(false)).unwrap();
    assert_eq!(anim.state(id), Some(TimelineState::Idle));

    assert_eq!(anim.tick(0.25, &mut store).unwrap(), 1);
    assert_eq!(anim.state(id), Some(TimelineState::Playing));
    assert_eq!(amount(&store, &t), Some(ParameterValue::Float(0.25)));

    anim.tick(2.0, &mut store).unwrap();
    assert_eq!(anim.state(id), Some(TimelineState::Finished));
    assert_eq!(amount(&store, &t), Some(ParameterValue::Float(1.0)));

    assert_eq!(anim.tick(1.0, &mut store).unwrap(), 0);
    assert_eq!(amount(&store, &t), Some(ParameterValue::Float(1.0)));
}

#[test]
fn looping_wraps_elapsed_time() {
    let p = program();
    let t = TargetId::object(9);
    let mut anim = ParameterAnimator::new();
    let mut store = ParameterStore::new();

    let id = anim.start(&t, &p, "Amount", ramp(true)).unwrap();
    anim.tick(0.5, &mut store).unwrap();
    anim.tick(1.0, &mut store).unwrap();
    assert_eq!(anim.state(id), Some(TimelineState::Looping));
    assert_eq!(anim.elapsed(id), Some(0.5));
    assert_eq!(amount(&store, &t), Some(ParameterValue::Float(0.5)));
}

#[test]
fn restarting_replaces_the_timeline_atomically() {
    let p = program();
    let t = TargetId::layer("ground");
    let mut anim = ParameterAnimator::new();
    let mut store = ParameterStore::new();

    let first = anim.start(&t, &p, "Amount", ramp(false)).unwrap();
    anim.tick(0.5, &mut store).unwrap();

    let down = Timeline::new(
        vec![
            Keyframe::new(0.0, ParameterValue::Float(1.0)),
            Keyframe::new(1.0, ParameterValue::Float(0.0)),
        ],
        false,
    )
    .unwrap();
    let second = anim.start(&t, &p, "Amount", down).unwrap();
    assert_eq!(anim.len(), 1);
    assert_eq!(anim.state(first), None);
    assert!(!anim.stop(first));

    assert_eq!(anim.tick(0.25, &mut store).unwrap(), 1);
    assert_eq!(amount(&store, &t), Some(ParameterValue::Float(0.75)));
    assert!(anim.stop(second));
    assert!(anim.is_empty());
}

#[test]
fn destroying_a_target_frees_only_its_timelines() {
    let p = program();
    let a = TargetId::layer("ground");
    let b = TargetId::layer("overhead");
    let mut anim = ParameterAnimator::new();

    let ia = anim.start(&a, &p, "Amount", ramp(true)).unwrap();
    let ib = anim.start(&b, &p, "Amount", ramp(true)).unwrap();
    assert_eq!(anim.destroy_target(&a), 1);
    assert_eq!(anim.state(ia), None);
    assert_eq!(anim.state(ib), Some(TimelineState::Idle));

    // Freed slots are reused with a fresh generation.
    let ic = anim.start(&a, &p, "Amount", ramp(false)).unwrap();
    assert_ne!(ia, ic);
    assert_eq!(anim.len(), 2);
}

#[test]
fn rejects_bad_frame_deltas() {
    let mut anim = ParameterAnimator::new();
    let mut store = ParameterStore::new();
    assert!(matches!(
        anim.tick(f32::NAN, &mut store),
        Err(PipelineError::Animation(_))
    ));
    assert!(anim.tick(-0.1, &mut store).is_err());
    assert_eq!(anim.tick(0.0, &mut store).unwrap(), 0);
}
