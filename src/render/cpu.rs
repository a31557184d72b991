use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::foundation::core::{Rgba8Premul, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::foundation::math::{premul_from_u8, premul_to_u8, premultiply, unpremultiply};
use crate::params::store::ParamBlockKey;
use crate::program::definition::{ProgramHandle, ShaderProgram};
use crate::program::value::ParameterValue;
use crate::render::backend::{FrameRGBA, PassBackend, PassBlend, PassDesc};
use crate::render::blend::{BlendKernel, blend_premul};
use crate::render::buffer_pool::{BufferId, OffscreenBuffer, OffscreenBufferPool, PixelFormat};
use crate::shader::bytecode::{BuiltinVar, TextureSlot, Value, Vector};
use crate::shader::vm::{ShaderEnv, VmError, VmScratch, run};

/// Knobs for [`CpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CpuBackendOpts {
    /// Shade rows on the rayon pool.
    pub parallel: bool,
}

impl Default for CpuBackendOpts {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Backend counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuBackendStats {
    /// `bind_program` calls.
    pub programs_bound: u64,
    /// `write_parameter` calls.
    pub parameter_writes: u64,
    /// Passes executed.
    pub passes: u64,
    /// Pixels shaded across all passes.
    pub pixels_shaded: u64,
}

#[derive(Clone, Debug, PartialEq)]
enum Uniform {
    Num(Vector),
    Bool(bool),
    Texture(String),
}

impl From<&ParameterValue> for Uniform {
    fn from(value: &ParameterValue) -> Self {
        match value {
            ParameterValue::Float(v) => Self::Num(Vector::scalar(*v)),
            ParameterValue::Vec2(v) => Self::Num(Vector::from_slice(v)),
            ParameterValue::Vec3(v) => Self::Num(Vector::from_slice(v)),
            ParameterValue::Vec4(v) => Self::Num(Vector::from_slice(v)),
            ParameterValue::Bool(b) => Self::Bool(*b),
            ParameterValue::Texture(t) => Self::Texture(t.name().to_owned()),
        }
    }
}

/// A registered texture, premultiplied RGBA8.
#[derive(Debug)]
struct Texture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

enum Binding {
    Value(Value),
    Texture(Arc<Texture>),
}

/// Reference backend: runs the shader VM once per output pixel.
///
/// Textures are sampled nearest with clamp-to-edge. Programs see straight alpha and their
/// result is premultiplied before the blend stage.
#[derive(Debug, Default)]
pub struct CpuBackend {
    opts: CpuBackendOpts,
    bound: Option<ProgramHandle>,
    uniforms: HashMap<ParamBlockKey, HashMap<String, Uniform>>,
    textures: HashMap<String, Arc<Texture>>,
    stats: CpuBackendStats,
}

impl CpuBackend {
    /// New backend with no textures registered.
    pub fn new(opts: CpuBackendOpts) -> Self {
        Self {
            opts,
            ..Self::default()
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CpuBackendStats {
        self.stats.clone()
    }

    /// Make `frame` available to texture parameters under `name`. Replaces an earlier texture
    /// with the same name.
    pub fn register_texture(&mut self, name: impl Into<String>, frame: &FrameRGBA) -> PipelineResult<()> {
        frame.validate()?;
        let data = if frame.premultiplied {
            frame.data.clone()
        } else {
            frame
                .data
                .chunks_exact(4)
                .flat_map(|s| Rgba8Premul::from_straight_rgba(s[0], s[1], s[2], s[3]).to_array())
                .collect()
        };
        self.textures.insert(
            name.into(),
            Arc::new(Texture {
                width: frame.width,
                height: frame.height,
                data,
            }),
        );
        Ok(())
    }

    /// Parameter blocks currently holding uniforms.
    pub fn block_count(&self) -> usize {
        self.uniforms.len()
    }

    fn bindings(&self, program: &ShaderProgram, block: &ParamBlockKey) -> PipelineResult<Vec<Binding>> {
        let uniforms = self.uniforms.get(block);
        let mut out = Vec::with_capacity(program.compiled.params.len());
        for p in &program.compiled.params {
            let uniform = uniforms.and_then(|u| u.get(&p.name)).ok_or_else(|| {
                PipelineError::evaluation(format!(
                    "parameter '{}' of '{}' has no value for {}",
                    p.name,
                    program.id(),
                    block.target
                ))
            })?;
            out.push(match uniform {
                Uniform::Num(v) => Binding::Value(Value::Num(*v)),
                Uniform::Bool(b) => Binding::Value(Value::Bool(*b)),
                Uniform::Texture(name) => {
                    let tex = self.textures.get(name).ok_or_else(|| {
                        PipelineError::evaluation(format!(
                            "texture '{name}' bound to '{}' is not registered",
                            p.name
                        ))
                    })?;
                    Binding::Texture(Arc::clone(tex))
                }
            });
        }
        Ok(out)
    }
}

#[derive(Clone, Copy)]
struct ColorView<'a> {
    width: u32,
    height: u32,
    data: &'a [u8],
}

impl<'a> ColorView<'a> {
    fn of(buf: &'a OffscreenBuffer) -> PipelineResult<Self> {
        Ok(Self {
            width: buf.width(),
            height: buf.height(),
            data: buf.color()?,
        })
    }

    fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y.min(self.height - 1) as usize) * (self.width as usize)
            + x.min(self.width - 1) as usize)
            * 4;
        match self.data.get(i..i + 4) {
            Some(px) => [px[0], px[1], px[2], px[3]],
            None => [0; 4],
        }
    }

    fn sample(&self, uv: [f32; 2]) -> [u8; 4] {
        let (x, y) = nearest(uv, self.width, self.height);
        self.texel(x, y)
    }
}

#[derive(Clone, Copy)]
struct DepthView<'a> {
    width: u32,
    height: u32,
    data: &'a [f32],
}

impl DepthView<'_> {
    fn sample(&self, uv: [f32; 2]) -> f32 {
        let (x, y) = nearest(uv, self.width, self.height);
        let i = (y as usize) * (self.width as usize) + x as usize;
        self.data.get(i).copied().unwrap_or(1.0)
    }
}

fn nearest(uv: [f32; 2], width: u32, height: u32) -> (u32, u32) {
    let fx = (uv[0] * width as f32).floor();
    let fy = (uv[1] * height as f32).floor();
    let x = if fx.is_nan() { 0.0 } else { fx.clamp(0.0, (width - 1) as f32) };
    let y = if fy.is_nan() { 0.0 } else { fy.clamp(0.0, (height - 1) as f32) };
    (x as u32, y as u32)
}

fn num(c: [f32; 4]) -> Value {
    Value::Num(Vector::from_slice(&c))
}

fn clamp_straight(c: [f32; 4]) -> [f32; 4] {
    c.map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
}

/// Bindings shared by every pixel of a pass.
struct PassInputs<'a> {
    width: u32,
    height: u32,
    input: ColorView<'a>,
    previous: Option<ColorView<'a>>,
    depth: Option<DepthView<'a>>,
}

/// Per-pixel environment for one program run.
struct PixelEnv<'a> {
    inputs: &'a PassInputs<'a>,
    params: &'a [Binding],
    x: u32,
    y: u32,
    src: [f32; 4],
    dst: [f32; 4],
}

impl ShaderEnv for PixelEnv<'_> {
    fn param(&self, idx: u16) -> Result<Value, VmError> {
        match self.params.get(idx as usize) {
            Some(Binding::Value(v)) => Ok(*v),
            Some(Binding::Texture(_)) => Err(VmError::new("texture parameter used as a value")),
            None => Err(VmError::new(format!("parameter slot {idx} out of range"))),
        }
    }

    fn var(&self, var: BuiltinVar) -> Value {
        match var {
            BuiltinVar::Uv => Value::Num(Vector::from_slice(&[
                (self.x as f32 + 0.5) / self.inputs.width as f32,
                (self.y as f32 + 0.5) / self.inputs.height as f32,
            ])),
            BuiltinVar::Pixel => Value::Num(Vector::from_slice(&[self.x as f32, self.y as f32])),
            BuiltinVar::Src => num(self.src),
            BuiltinVar::Dst => num(self.dst),
        }
    }

    fn sample(&self, slot: TextureSlot, uv: [f32; 2]) -> Result<[f32; 4], VmError> {
        match slot {
            TextureSlot::Input => Ok(unpremultiply(self.inputs.input.sample(uv))),
            TextureSlot::Previous => Ok(self
                .inputs
                .previous
                .map_or([0.0; 4], |p| unpremultiply(p.sample(uv)))),
            TextureSlot::Depth => {
                let d = self
                    .inputs
                    .depth
                    .ok_or_else(|| VmError::new("no depth companion bound"))?
                    .sample(uv);
                Ok([d, d, d, 1.0])
            }
            TextureSlot::Param(idx) => match self.params.get(idx as usize) {
                Some(Binding::Texture(t)) => {
                    let view = ColorView {
                        width: t.width,
                        height: t.height,
                        data: &t.data,
                    };
                    Ok(unpremultiply(view.sample(uv)))
                }
                _ => Err(VmError::new(format!("parameter slot {idx} is not a texture"))),
            },
        }
    }
}

enum BlendStage<'a> {
    Kernel(BlendKernel),
    Program {
        program: &'a ShaderProgram,
        params: Vec<Binding>,
    },
}

struct PassPlan<'a> {
    program: &'a ShaderProgram,
    params: Vec<Binding>,
    blend: BlendStage<'a>,
}

impl PassPlan<'_> {
    fn shade_row(
        &self,
        inputs: &PassInputs<'_>,
        y: u32,
        row: &mut [u8],
        scratch: &mut VmScratch,
    ) -> Result<(), VmError> {
        for (x, out) in (0u32..).zip(row.chunks_exact_mut(4)) {
            let input_px = inputs.input.texel(x, y);
            let prev_px = inputs.previous.map(|p| p.texel(x, y));

            let env = PixelEnv {
                inputs,
                params: &self.params,
                x,
                y,
                src: unpremultiply(input_px),
                dst: prev_px.map_or([0.0; 4], unpremultiply),
            };
            let color = run(&self.program.compiled.code, &env, scratch)?;

            let blended = match (&self.blend, prev_px) {
                (_, None) => premultiply(color),
                (BlendStage::Kernel(k), Some(prev)) => {
                    blend_premul(*k, premultiply(color), premul_from_u8(prev))
                }
                (BlendStage::Program { program, params }, Some(prev)) => {
                    let env = PixelEnv {
                        inputs,
                        params,
                        x,
                        y,
                        src: clamp_straight(color),
                        dst: unpremultiply(prev),
                    };
                    premultiply(run(&program.compiled.code, &env, scratch)?)
                }
            };
            out.copy_from_slice(&premul_to_u8(blended));
        }
        Ok(())
    }
}

impl PassBackend for CpuBackend {
    fn bind_program(&mut self, program: &ProgramHandle) -> PipelineResult<()> {
        self.bound = Some(ProgramHandle::clone(program));
        self.stats.programs_bound += 1;
        Ok(())
    }

    fn write_parameter(
        &mut self,
        block: &ParamBlockKey,
        name: &str,
        value: &ParameterValue,
    ) -> PipelineResult<()> {
        self.uniforms
            .entry(block.clone())
            .or_default()
            .insert(name.to_owned(), Uniform::from(value));
        self.stats.parameter_writes += 1;
        Ok(())
    }

    fn forget_target(&mut self, target: &TargetId) {
        self.uniforms.retain(|block, _| &block.target != target);
    }

    fn exec_pass(&mut self, pass: &PassDesc<'_>, pool: &mut OffscreenBufferPool) -> PipelineResult<()> {
        let bound = self
            .bound
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, pass.program));
        if !bound {
            return Err(PipelineError::validation(format!(
                "program '{}' must be bound before its pass runs",
                pass.program.id()
            )));
        }
        if pass.program.reads_depth() && pass.depth.is_none() {
            return Err(PipelineError::validation(format!(
                "program '{}' samples depth but the layer has no depth companion",
                pass.program.id()
            )));
        }
        if let Some(depth) = pass.depth {
            check_depth_format(pool, depth)?;
        }

        let blend = match pass.blend {
            PassBlend::Replace => BlendStage::Kernel(BlendKernel::Replace),
            PassBlend::Additive => BlendStage::Kernel(BlendKernel::Additive),
            PassBlend::Multiply => BlendStage::Kernel(BlendKernel::Multiply),
            PassBlend::Custom { program, block } => BlendStage::Program {
                program: program.as_ref(),
                params: self.bindings(program, block)?,
            },
        };
        let plan = PassPlan {
            program: pass.program.as_ref(),
            params: self.bindings(pass.program, pass.block)?,
            blend,
        };

        let mut reads: SmallVec<[BufferId; 3]> = SmallVec::new();
        reads.push(pass.input);
        reads.extend(pass.previous);
        reads.extend(pass.depth);
        let parallel = self.opts.parallel;

        let pixels = pool.with_pass_buffers(&reads, pass.output, |bufs, out| {
            let input = ColorView::of(bufs[0])?;
            let previous = match pass.previous {
                Some(_) => Some(ColorView::of(bufs[1])?),
                None => None,
            };
            let depth = match pass.depth {
                Some(_) => {
                    let buf = bufs[bufs.len() - 1];
                    Some(DepthView {
                        width: buf.width(),
                        height: buf.height(),
                        data: buf.depth()?,
                    })
                }
                None => None,
            };
            let inputs = PassInputs {
                width: out.width(),
                height: out.height(),
                input,
                previous,
                depth,
            };

            let row_len = out.width() as usize * 4;
            let rows = out.color_mut()?;
            let result = if parallel {
                rows.par_chunks_mut(row_len)
                    .enumerate()
                    .try_for_each_init(VmScratch::default, |scratch, (y, row)| {
                        plan.shade_row(&inputs, y as u32, row, scratch)
                    })
            } else {
                let mut scratch = VmScratch::default();
                rows.chunks_mut(row_len)
                    .enumerate()
                    .try_for_each(|(y, row)| plan.shade_row(&inputs, y as u32, row, &mut scratch))
            };
            result.map_err(|e| {
                PipelineError::evaluation(format!("pass '{}' failed: {e}", pass.program.id()))
            })?;
            Ok(u64::from(inputs.width) * u64::from(inputs.height))
        })?;

        self.stats.passes += 1;
        self.stats.pixels_shaded += pixels;
        Ok(())
    }
}

fn check_depth_format(pool: &OffscreenBufferPool, depth: BufferId) -> PipelineResult<()> {
    let format = pool.get(depth)?.format();
    if format != PixelFormat::R32Float {
        return Err(PipelineError::format_mismatch(format!(
            "depth companion {depth:?} is {format:?}, expected R32Float"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
