use std::collections::HashMap;

use crate::foundation::core::{Rgba8Premul, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::render::backend::FrameRGBA;
use crate::render::blend::over;
use crate::render::buffer_pool::{BufferId, OffscreenBufferPool};

const COLOR_PURPOSE: &str = "depth.color";
const DEPTH_PURPOSE: &str = "depth.aux";

/// How view-space depth maps into the `[0, 1]` values stored in the auxiliary buffer.
///
/// Smaller values are nearer. Fragments beyond the range clamp to its ends.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum DepthEncoding {
    /// `(z - near) / (far - near)`.
    Linear {
        /// View depth stored as 0.
        near: f32,
        /// View depth stored as 1.
        far: f32,
    },
    /// `ln(z / near) / ln(far / near)`; spends more precision close to the viewer.
    Logarithmic {
        /// View depth stored as 0. Must be positive.
        near: f32,
        /// View depth stored as 1.
        far: f32,
    },
}

impl Default for DepthEncoding {
    fn default() -> Self {
        Self::Linear {
            near: 0.0,
            far: 1.0,
        }
    }
}

impl DepthEncoding {
    /// Check the range is usable.
    pub fn validate(self) -> PipelineResult<()> {
        let (near, far, log) = match self {
            Self::Linear { near, far } => (near, far, false),
            Self::Logarithmic { near, far } => (near, far, true),
        };
        if !near.is_finite() || !far.is_finite() || near >= far {
            return Err(PipelineError::validation(format!(
                "depth range needs finite near < far, got {near}..{far}"
            )));
        }
        if log && near <= 0.0 {
            return Err(PipelineError::validation(format!(
                "logarithmic depth needs near > 0, got {near}"
            )));
        }
        Ok(())
    }

    /// Encode a view depth.
    pub fn encode(self, view_z: f32) -> f32 {
        let d = match self {
            Self::Linear { near, far } => (view_z - near) / (far - near),
            Self::Logarithmic { near, far } => {
                (view_z.max(near) / near).ln() / (far / near).ln()
            }
        };
        if d.is_nan() { 1.0 } else { d.clamp(0.0, 1.0) }
    }
}

/// Buffers bound by [`DepthCompositor::begin_depth_encoded_pass`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthTargets {
    /// Premultiplied color buffer receiving the geometry.
    pub color: BufferId,
    /// Single-channel float buffer receiving encoded depth.
    pub depth: BufferId,
}

#[derive(Debug)]
struct DepthPass {
    targets: DepthTargets,
    /// Cleared by `end_pass`; the depth buffer outlives the color one.
    color_live: bool,
}

/// Geometry pass that writes encoded depth next to color, so later screen-space passes can
/// sample it as an ordinary texture.
///
/// Depth is written during the draw itself. There is no path that reads a hardware depth
/// attachment back.
#[derive(Debug, Default)]
pub struct DepthCompositor {
    encoding: DepthEncoding,
    passes: HashMap<TargetId, DepthPass>,
}

impl DepthCompositor {
    /// Compositor using `encoding`.
    pub fn new(encoding: DepthEncoding) -> PipelineResult<Self> {
        encoding.validate()?;
        Ok(Self {
            encoding,
            passes: HashMap::new(),
        })
    }

    /// Active encoding.
    pub fn encoding(&self) -> DepthEncoding {
        self.encoding
    }

    /// Acquire and clear a color buffer plus an auxiliary depth buffer for `target`.
    ///
    /// Depth starts at 1.0 (farthest). Fails when the target already has a pass open.
    pub fn begin_depth_encoded_pass(
        &mut self,
        pool: &mut OffscreenBufferPool,
        target: &TargetId,
        width: u32,
        height: u32,
    ) -> PipelineResult<DepthTargets> {
        if self.passes.contains_key(target) {
            return Err(PipelineError::validation(format!(
                "depth pass for '{target}' is already open"
            )));
        }
        let color = pool.acquire(COLOR_PURPOSE, width, height, false)?;
        let depth = match pool.acquire(DEPTH_PURPOSE, width, height, true) {
            Ok(id) => id,
            Err(e) => {
                pool.release(color)?;
                return Err(e);
            }
        };
        pool.get_mut(color)?.clear();
        pool.get_mut(depth)?.depth_mut()?.fill(1.0);

        let targets = DepthTargets { color, depth };
        self.passes.insert(
            target.clone(),
            DepthPass {
                targets,
                color_live: true,
            },
        );
        tracing::debug!(target_id = %target, width, height, "opened depth-encoded pass");
        Ok(targets)
    }

    fn open(&self, target: &TargetId) -> PipelineResult<&DepthPass> {
        self.passes.get(target).ok_or_else(|| {
            PipelineError::validation(format!("no depth pass open for '{target}'"))
        })
    }

    fn open_color(&self, target: &TargetId) -> PipelineResult<DepthTargets> {
        let pass = self.open(target)?;
        if !pass.color_live {
            return Err(PipelineError::validation(format!(
                "depth pass for '{target}' has already ended"
            )));
        }
        Ok(pass.targets)
    }

    /// Depth-test and write one fragment. Returns whether it was kept.
    ///
    /// A fragment passes when its encoded depth is not farther than what is stored, so later
    /// draws at equal depth paint over earlier ones.
    pub fn encode_fragment(
        &mut self,
        pool: &mut OffscreenBufferPool,
        target: &TargetId,
        x: u32,
        y: u32,
        color: Rgba8Premul,
        view_z: f32,
    ) -> PipelineResult<bool> {
        let t = self.open_color(target)?;
        let d = self.encoding.encode(view_z);
        let width = pool.get(t.depth)?.width();
        let height = pool.get(t.depth)?.height();
        if x >= width || y >= height {
            return Ok(false);
        }
        let i = (y as usize) * (width as usize) + x as usize;
        write_fragment(pool, t, i, color.to_array(), d)
    }

    /// Draw a premultiplied image with its top-left corner at `origin`, every opaque-enough
    /// pixel at `view_z`. Returns the number of fragments kept.
    pub fn draw_frame(
        &mut self,
        pool: &mut OffscreenBufferPool,
        target: &TargetId,
        frame: &FrameRGBA,
        origin: [i32; 2],
        view_z: f32,
    ) -> PipelineResult<usize> {
        frame.validate()?;
        if !frame.premultiplied {
            return Err(PipelineError::validation(
                "depth pass draws expect premultiplied frames",
            ));
        }
        let t = self.open_color(target)?;
        let d = self.encoding.encode(view_z);
        let width = i64::from(pool.get(t.depth)?.width());
        let height = i64::from(pool.get(t.depth)?.height());

        let mut kept = 0usize;
        for sy in 0..frame.height {
            let y = i64::from(origin[1]) + i64::from(sy);
            if !(0..height).contains(&y) {
                continue;
            }
            for sx in 0..frame.width {
                let x = i64::from(origin[0]) + i64::from(sx);
                if !(0..width).contains(&x) {
                    continue;
                }
                let Some(px) = frame.pixel(sx, sy) else {
                    continue;
                };
                if px[3] == 0 {
                    continue;
                }
                let i = (y * width + x) as usize;
                if write_fragment(pool, t, i, px, d)? {
                    kept += 1;
                }
            }
        }
        Ok(kept)
    }

    /// The auxiliary depth buffer of `target`, for use as a pass depth companion.
    pub fn get_depth_texture(&self, target: &TargetId) -> PipelineResult<BufferId> {
        Ok(self.open(target)?.targets.depth)
    }

    /// Read back the color result and release the color buffer. The depth buffer stays
    /// available through [`DepthCompositor::get_depth_texture`] until
    /// [`DepthCompositor::release`].
    pub fn end_pass(
        &mut self,
        pool: &mut OffscreenBufferPool,
        target: &TargetId,
    ) -> PipelineResult<FrameRGBA> {
        let t = self.open_color(target)?;
        let buf = pool.get(t.color)?;
        let frame = FrameRGBA {
            width: buf.width(),
            height: buf.height(),
            data: buf.color()?.to_vec(),
            premultiplied: true,
        };
        pool.release(t.color)?;
        if let Some(pass) = self.passes.get_mut(target) {
            pass.color_live = false;
        }
        Ok(frame)
    }

    /// Return every buffer owned by `target`'s pass to the pool.
    pub fn release(&mut self, pool: &mut OffscreenBufferPool, target: &TargetId) -> PipelineResult<()> {
        let Some(pass) = self.passes.remove(target) else {
            return Ok(());
        };
        if pass.color_live {
            pool.release(pass.targets.color)?;
        }
        pool.release(pass.targets.depth)
    }

    /// Release every open pass, in target order.
    pub fn release_all(&mut self, pool: &mut OffscreenBufferPool) -> PipelineResult<()> {
        let mut targets: Vec<TargetId> = self.passes.keys().cloned().collect();
        targets.sort();
        for target in targets {
            self.release(pool, &target)?;
        }
        Ok(())
    }

    /// Number of open passes.
    pub fn open_passes(&self) -> usize {
        self.passes.len()
    }
}

fn write_fragment(
    pool: &mut OffscreenBufferPool,
    t: DepthTargets,
    i: usize,
    px: [u8; 4],
    d: f32,
) -> PipelineResult<bool> {
    let depth = pool.get_mut(t.depth)?.depth_mut()?;
    let Some(stored) = depth.get_mut(i) else {
        return Ok(false);
    };
    if d > *stored {
        return Ok(false);
    }
    *stored = d;

    let color = pool.get_mut(t.color)?.color_mut()?;
    let Some(dst) = color.get_mut(i * 4..i * 4 + 4) else {
        return Ok(false);
    };
    let out = over([dst[0], dst[1], dst[2], dst[3]], px, 1.0);
    dst.copy_from_slice(&out);
    Ok(true)
}

#[cfg(test)]
#[path = "../../tests/unit/render/depth.rs"]
mod tests;
