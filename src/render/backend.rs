use crate::foundation::core::{Rgba8Premul, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::params::store::ParamBlockKey;
use crate::program::definition::ProgramHandle;
use crate::program::value::ParameterValue;
use crate::render::buffer_pool::{BufferId, OffscreenBufferPool};

/// A rendered frame as RGBA8 pixels.
///
/// Frames produced by the pipeline are premultiplied. The flag makes this explicit at API
/// boundaries; uploads of straight-alpha frames are premultiplied on the way in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Solid-color premultiplied frame.
    pub fn solid(width: u32, height: u32, color: Rgba8Premul) -> Self {
        let px = color.to_array();
        let n = (width as usize).saturating_mul(height as usize);
        let mut data = Vec::with_capacity(n.saturating_mul(4));
        for _ in 0..n {
            data.extend_from_slice(&px);
        }
        Self {
            width,
            height,
            data,
            premultiplied: true,
        }
    }

    /// Check that `data` matches the dimensions.
    pub fn validate(&self) -> PipelineResult<()> {
        let expected = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4);
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(PipelineError::validation(format!(
                "frame {}x{} has {} bytes, expected {expected}",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Pixel at `(x, y)`, or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// The blend stage of one pass, with custom blend programs already resolved.
#[derive(Clone, Copy, Debug)]
pub enum PassBlend<'a> {
    /// Output replaces the previous result.
    Replace,
    /// Saturating add against the previous result.
    Additive,
    /// Multiply against the previous result.
    Multiply,
    /// Run `program`, whose parameters live in `block`, with `src`/`dst` bound.
    Custom {
        /// Blend program.
        program: &'a ProgramHandle,
        /// Parameter block of the blend program.
        block: &'a ParamBlockKey,
    },
}

/// Everything a backend needs to execute one pass.
#[derive(Clone, Copy, Debug)]
pub struct PassDesc<'a> {
    /// Parameter block committed for `program`.
    pub block: &'a ParamBlockKey,
    /// Program to run.
    pub program: &'a ProgramHandle,
    /// Pass input: the source image for the first pass, the prior output afterwards.
    pub input: BufferId,
    /// Previous pass output, bound only for non-replace blends.
    pub previous: Option<BufferId>,
    /// Depth companion, when the layer has one.
    pub depth: Option<BufferId>,
    /// Freshly cleared output buffer.
    pub output: BufferId,
    /// Blend stage.
    pub blend: PassBlend<'a>,
}

/// Backend contract used by the stack compositor.
///
/// Buffers live in the [`OffscreenBufferPool`]; backends only run programs over them and keep
/// whatever uniform state they need per parameter block.
pub trait PassBackend {
    /// Make `program` the active program.
    fn bind_program(&mut self, program: &ProgramHandle) -> PipelineResult<()>;

    /// Upload one parameter value for a block. Called only for dirty values.
    fn write_parameter(
        &mut self,
        block: &ParamBlockKey,
        name: &str,
        value: &ParameterValue,
    ) -> PipelineResult<()>;

    /// Run one pass.
    fn exec_pass(&mut self, pass: &PassDesc<'_>, pool: &mut OffscreenBufferPool)
    -> PipelineResult<()>;

    /// Drop any per-block state kept for `target`. Called when the target is destroyed.
    fn forget_target(&mut self, _target: &TargetId) {}

    /// Clear a buffer to transparent.
    fn clear(&mut self, pool: &mut OffscreenBufferPool, buffer: BufferId) -> PipelineResult<()> {
        pool.get_mut(buffer)?.clear();
        Ok(())
    }

    /// Copy a frame into a color buffer, premultiplying straight-alpha input.
    fn upload(
        &mut self,
        pool: &mut OffscreenBufferPool,
        buffer: BufferId,
        frame: &FrameRGBA,
    ) -> PipelineResult<()> {
        frame.validate()?;
        let dst = pool.get_mut(buffer)?;
        if dst.width() != frame.width || dst.height() != frame.height {
            return Err(PipelineError::validation(format!(
                "upload of {}x{} frame into {}x{} buffer",
                frame.width,
                frame.height,
                dst.width(),
                dst.height()
            )));
        }
        let px = dst.color_mut()?;
        if frame.premultiplied {
            px.copy_from_slice(&frame.data);
        } else {
            for (d, s) in px.chunks_exact_mut(4).zip(frame.data.chunks_exact(4)) {
                d.copy_from_slice(&Rgba8Premul::from_straight_rgba(s[0], s[1], s[2], s[3]).to_array());
            }
        }
        Ok(())
    }

    /// Read a color buffer back as a premultiplied frame.
    fn readback(
        &mut self,
        pool: &OffscreenBufferPool,
        buffer: BufferId,
    ) -> PipelineResult<FrameRGBA> {
        let buf = pool.get(buffer)?;
        Ok(FrameRGBA {
            width: buf.width(),
            height: buf.height(),
            data: buf.color()?.to_vec(),
            premultiplied: true,
        })
    }
}
