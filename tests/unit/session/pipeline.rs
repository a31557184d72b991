use super::*;

use crate::foundation::error::PipelineError;
use crate::animation::timeline::Keyframe;
use crate::program::definition::{ProgramDefinition, ProgramLibrary};
use crate::program::schema::{ParamDecl, ParamSchema};
use crate::program::value::ParamType;
use crate::render::cpu::{CpuBackend, CpuBackendOpts};
use crate::render::stack::ShaderSlot;

fn library() -> ProgramLibrary {
    let fade = ProgramDefinition::from_source(
        "let c = sample(input, uv); vec4(c.rgb, c.a * Amount)",
        ParamSchema::new()
            .with(
                "Amount",
                ParamDecl::new(ParamType::Float)
                    .with_default(ParameterValue::Float(1.0))
                    .with_range(0.0, 1.0),
            )
            .unwrap()
            .with(SCREEN_SIZE, ParamDecl::new(ParamType::Vec2))
            .unwrap(),
    );
    ProgramLibrary::new().with("fade", fade)
}

fn pipeline() -> ShaderPipeline<ProgramLibrary> {
    ShaderPipeline::new(library(), PipelineOpts::default()).unwrap()
}

fn ground() -> TargetId {
    TargetId::layer("ground")
}

fn fade_stack() -> ShaderStack {
    ShaderStack::new(ground())
        .with(ShaderSlot::new("fade", BlendMode::Replace, 0))
        .unwrap()
}

fn white() -> FrameRGBA {
    FrameRGBA::solid(2, 2, Rgba8Premul::from_straight_rgba(255, 255, 255, 255))
}

#[test]
fn apply_target_validates_every_override_first() {
    let mut p = pipeline();
    let bad = TargetShading::new(fade_stack())
        .with_override("fade", "Amount", ParameterValue::Float(0.5))
        .with_override("fade", "Amount", ParameterValue::Float(3.0));
    let err = p.apply_target(bad).unwrap_err();
    assert!(matches!(err, PipelineError::OutOfRange(_)));
    assert!(p.stack(&ground()).is_none());
    assert_eq!(p.store().get(&ground(), &ShaderId::from("fade"), "Amount"), None);

    let good = TargetShading::new(fade_stack())
        .with_override("fade", "Amount", ParameterValue::Float(0.5))
        .with_override("fade", SCREEN_SIZE, ParameterValue::Vec2([1.0, 1.0]));
    let report = p.apply_target(good).unwrap();
    assert_eq!(
        report,
        ApplyReport {
            stored: 1,
            ignored_reserved: 1
        }
    );
    assert!(p.stack(&ground()).is_some());
}

#[test]
fn set_parameter_surfaces_resolution_and_validation_errors() {
    let mut p = pipeline();
    let err = p
        .set_parameter(&ground(), &ShaderId::from("nope"), "Amount", ParameterValue::Float(0.1))
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    let err = p
        .set_parameter(&ground(), &ShaderId::from("fade"), "Amont", ParameterValue::Float(0.1))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownParameter(_)));
}

#[test]
fn composite_target_uses_the_registered_stack() {
    let mut p = pipeline();
    let mut backend = CpuBackend::new(CpuBackendOpts { parallel: false });
    p.set_viewport(2, 2).unwrap();

    // Nothing registered yet: passthrough.
    let out = p.composite_target(&mut backend, &ground(), &white(), None).unwrap();
    assert_eq!(out.frame, white());

    p.apply_target(
        TargetShading::new(fade_stack()).with_override(
            "fade",
            "Amount",
            ParameterValue::Float(0.0),
        ),
    )
    .unwrap();
    let out = p.composite_target(&mut backend, &ground(), &white(), None).unwrap();
    assert_eq!(out.frame.pixel(0, 0), Some([0, 0, 0, 0]));
    assert_eq!(out.stats.passes_executed, 1);
}

#[test]
fn update_feeds_animations_into_the_next_composite() {
    let mut p = pipeline();
    let mut backend = CpuBackend::new(CpuBackendOpts { parallel: false });
    p.apply_target(TargetShading::new(fade_stack())).unwrap();
    let timeline = Timeline::new(
        vec![
            Keyframe::new(0.0, ParameterValue::Float(1.0)),
            Keyframe::new(2.0, ParameterValue::Float(0.0)),
        ],
        false,
    )
    .unwrap();
    p.start_animation(&ground(), &ShaderId::from("fade"), "Amount", timeline)
        .unwrap();

    assert_eq!(p.update(1.0).unwrap(), 1);
    let out = p.composite_target(&mut backend, &ground(), &white(), None).unwrap();
    assert_eq!(out.frame.pixel(1, 1), Some([128, 128, 128, 128]));
}

#[test]
fn destroy_target_drops_all_owned_state() {
    let mut p = pipeline();
    let mut backend = CpuBackend::new(CpuBackendOpts { parallel: false });
    p.apply_target(TargetShading::new(fade_stack()).with_override(
        "fade",
        "Amount",
        ParameterValue::Float(0.2),
    ))
    .unwrap();
    let timeline = Timeline::new(vec![Keyframe::new(0.0, ParameterValue::Float(1.0))], true).unwrap();
    let id = p
        .start_animation(&ground(), &ShaderId::from("fade"), "Amount", timeline)
        .unwrap();
    p.composite_target(&mut backend, &ground(), &white(), None)
        .unwrap();
    p.end_frame().unwrap();
    let other = ShaderStack::new(TargetId::object(7))
        .with(ShaderSlot::new("fade", BlendMode::Replace, 0))
        .unwrap();
    p.composite_layer(&mut backend, &other, &white(), None)
        .unwrap();
    p.end_frame().unwrap();
    assert_eq!(backend.block_count(), 2);
    p.begin_depth_encoded_pass(&ground(), 2, 2).unwrap();

    p.destroy_target(&mut backend, &ground()).unwrap();
    assert_eq!(backend.block_count(), 1);
    assert!(p.stack(&ground()).is_none());
    assert_eq!(p.store().block_count(), 0);
    assert!(p.animator().state(id).is_none());
    assert!(p.depth_texture(&ground()).is_err());
    assert_eq!(p.pool().stats().checked_out, 0);
    assert!(!p.stop_animation(id));
}

#[test]
fn end_frame_closes_depth_passes_and_unpins_programs() {
    let mut p = pipeline();
    let mut backend = CpuBackend::new(CpuBackendOpts { parallel: false });
    p.begin_depth_encoded_pass(&ground(), 2, 2).unwrap();
    p.encode_fragment(&ground(), 0, 0, Rgba8Premul::from_straight_rgba(255, 255, 255, 255), 0.5)
        .unwrap();
    let geometry = p.end_depth_pass(&ground()).unwrap();
    let depth = p.depth_texture(&ground()).unwrap();
    p.composite_layer(&mut backend, &fade_stack(), &geometry, Some(depth))
        .unwrap();
    assert!(p.cache().is_pinned(&ShaderId::from("fade")));

    p.end_frame().unwrap();
    assert_eq!(p.frame(), 1);
    assert!(!p.cache().is_pinned(&ShaderId::from("fade")));
    assert_eq!(p.pool().stats().checked_out, 0);
}

#[test]
fn viewport_changes_invalidate_the_pool() {
    let mut p = pipeline();
    assert!(p.set_viewport(800, 600).unwrap());
    assert!(!p.set_viewport(800, 600).unwrap());
    assert!(p.set_viewport(800, 601).unwrap());
    assert_eq!(p.viewport().map(|c| c.height), Some(601));
    assert!(p.set_viewport(0, 4).is_err());
}
