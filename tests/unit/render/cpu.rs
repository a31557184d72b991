use super::*;

use crate::foundation::core::{ShaderId, TargetId};
use crate::program::definition::ProgramDefinition;
use crate::program::schema::{ParamDecl, ParamSchema};
use crate::program::value::{ParamType, TextureRef};

fn load(id: &str, src: &str, schema: ParamSchema) -> ProgramHandle {
    let def = ProgramDefinition::from_source(src, schema);
    Arc::new(ShaderProgram::load(ShaderId::from(id), def, 1).unwrap())
}

fn key(p: &ProgramHandle) -> ParamBlockKey {
    ParamBlockKey::new(TargetId::layer("ground"), p.id().clone())
}

fn upload(
    backend: &mut CpuBackend,
    pool: &mut OffscreenBufferPool,
    frame: &FrameRGBA,
) -> BufferId {
    let id = pool.acquire("test.in", frame.width, frame.height, false).unwrap();
    backend.upload(pool, id, frame).unwrap();
    id
}

fn red() -> FrameRGBA {
    FrameRGBA::solid(2, 2, Rgba8Premul::from_straight_rgba(255, 0, 0, 255))
}

fn run_pass(
    backend: &mut CpuBackend,
    pool: &mut OffscreenBufferPool,
    program: &ProgramHandle,
    input: BufferId,
    previous: Option<BufferId>,
    blend: PassBlend<'_>,
) -> PipelineResult<FrameRGBA> {
    let block = key(program);
    let output = pool.acquire("test.out", 2, 2, false)?;
    backend.bind_program(program)?;
    backend.exec_pass(
        &PassDesc {
            block: &block,
            program,
            input,
            previous,
            depth: None,
            output,
            blend,
        },
        pool,
    )?;
    backend.readback(pool, output)
}

#[test]
fn shades_every_pixel_from_uniforms() {
    for parallel in [true, false] {
        let schema = ParamSchema::new()
            .with("Tint", ParamDecl::new(ParamType::Vec4))
            .unwrap();
        let p = load("tint", "sample(input, uv) * Tint", schema);
        let mut backend = CpuBackend::new(CpuBackendOpts { parallel });
        let mut pool = OffscreenBufferPool::default();
        let input = upload(&mut backend, &mut pool, &red());

        backend
            .write_parameter(&key(&p), "Tint", &ParameterValue::Vec4([1.0, 1.0, 1.0, 0.5]))
            .unwrap();
        let out = run_pass(&mut backend, &mut pool, &p, input, None, PassBlend::Replace).unwrap();
        assert!(out.premultiplied);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(out.pixel(x, y), Some([128, 0, 0, 128]));
            }
        }
        assert_eq!(backend.stats().pixels_shaded, 4);
    }
}

#[test]
fn missing_uniforms_and_unbound_programs_fail() {
    let schema = ParamSchema::new()
        .with("Tint", ParamDecl::new(ParamType::Vec4))
        .unwrap();
    let p = load("tint", "sample(input, uv) * Tint", schema);
    let mut backend = CpuBackend::new(CpuBackendOpts::default());
    let mut pool = OffscreenBufferPool::default();
    let input = upload(&mut backend, &mut pool, &red());

    let err = run_pass(&mut backend, &mut pool, &p, input, None, PassBlend::Replace).unwrap_err();
    assert!(matches!(err, PipelineError::Evaluation(_)));

    let other = load("copy", "sample(input, uv)", ParamSchema::new());
    backend.bind_program(&other).unwrap();
    let block = key(&p);
    let output = pool.acquire("test.out", 2, 2, false).unwrap();
    let err = backend
        .exec_pass(
            &PassDesc {
                block: &block,
                program: &p,
                input,
                previous: None,
                depth: None,
                output,
                blend: PassBlend::Replace,
            },
            &mut pool,
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn multiply_blends_against_previous_output() {
    let blue_half = load("half", "vec4(sample(input, uv).rgb, 0.5)", ParamSchema::new());
    let mut backend = CpuBackend::new(CpuBackendOpts::default());
    let mut pool = OffscreenBufferPool::default();
    let blue = FrameRGBA::solid(2, 2, Rgba8Premul::from_straight_rgba(0, 0, 255, 255));
    let input = upload(&mut backend, &mut pool, &blue);
    let prev = upload(&mut backend, &mut pool, &blue);

    let out = run_pass(
        &mut backend,
        &mut pool,
        &blue_half,
        input,
        Some(prev),
        PassBlend::Multiply,
    )
    .unwrap();
    assert_eq!(out.pixel(0, 0), Some([0, 0, 128, 128]));

    // Without a previous output the blend stage is skipped.
    let out = run_pass(&mut backend, &mut pool, &blue_half, input, None, PassBlend::Multiply)
        .unwrap();
    assert_eq!(out.pixel(1, 1), Some([0, 0, 128, 128]));
}

#[test]
fn custom_blend_program_sees_src_and_dst() {
    let copy = load("copy", "sample(input, uv)", ParamSchema::new());
    let blend = load("avg", "mix(src, dst, 0.5)", ParamSchema::new());
    let mut backend = CpuBackend::new(CpuBackendOpts::default());
    let mut pool = OffscreenBufferPool::default();
    let input = upload(&mut backend, &mut pool, &red());
    let blue = FrameRGBA::solid(2, 2, Rgba8Premul::from_straight_rgba(0, 0, 255, 255));
    let prev = upload(&mut backend, &mut pool, &blue);

    let block = key(&blend);
    let out = run_pass(
        &mut backend,
        &mut pool,
        &copy,
        input,
        Some(prev),
        PassBlend::Custom {
            program: &blend,
            block: &block,
        },
    )
    .unwrap();
    assert_eq!(out.pixel(0, 0), Some([128, 0, 128, 255]));
}

#[test]
fn texture_parameters_sample_registered_frames() {
    let schema = ParamSchema::new()
        .with("Mask", ParamDecl::new(ParamType::Texture))
        .unwrap();
    let p = load("mask", "sample(Mask, uv)", schema);
    let mut backend = CpuBackend::new(CpuBackendOpts::default());
    let mut pool = OffscreenBufferPool::default();
    let input = upload(&mut backend, &mut pool, &red());
    backend
        .write_parameter(
            &key(&p),
            "Mask",
            &ParameterValue::Texture(TextureRef::new("noise")),
        )
        .unwrap();

    let err = run_pass(&mut backend, &mut pool, &p, input, None, PassBlend::Replace).unwrap_err();
    assert!(matches!(err, PipelineError::Evaluation(_)));

    let straight_green = FrameRGBA {
        width: 1,
        height: 1,
        data: vec![0, 255, 0, 255],
        premultiplied: false,
    };
    backend.register_texture("noise", &straight_green).unwrap();
    let out = run_pass(&mut backend, &mut pool, &p, input, None, PassBlend::Replace).unwrap();
    assert_eq!(out.pixel(1, 0), Some([0, 255, 0, 255]));
}

#[test]
fn depth_companion_must_be_single_channel() {
    let p = load("fog", "vec4(sample(depth, uv).rgb, 1)", ParamSchema::new());
    let mut backend = CpuBackend::new(CpuBackendOpts::default());
    let mut pool = OffscreenBufferPool::default();
    let input = upload(&mut backend, &mut pool, &red());
    let block = key(&p);
    backend.bind_program(&p).unwrap();

    let exec = |backend: &mut CpuBackend,
                pool: &mut OffscreenBufferPool,
                depth: Option<BufferId>|
     -> PipelineResult<FrameRGBA> {
        let output = pool.acquire("test.out", 2, 2, false)?;
        backend.exec_pass(
            &PassDesc {
                block: &block,
                program: &p,
                input,
                previous: None,
                depth,
                output,
                blend: PassBlend::Replace,
            },
            pool,
        )?;
        backend.readback(pool, output)
    };

    let err = exec(&mut backend, &mut pool, None).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = exec(&mut backend, &mut pool, Some(input)).unwrap_err();
    assert!(matches!(err, PipelineError::FormatMismatch(_)));

    let depth = pool.acquire("test.depth", 2, 2, true).unwrap();
    pool.get_mut(depth).unwrap().depth_mut().unwrap().fill(0.2);
    let out = exec(&mut backend, &mut pool, Some(depth)).unwrap();
    assert_eq!(out.pixel(0, 0), Some([51, 51, 51, 255]));
}
