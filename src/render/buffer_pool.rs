use std::collections::HashMap;

use crate::foundation::core::Canvas;
use crate::foundation::error::{PipelineError, PipelineResult};

/// Internal storage format of an offscreen buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Premultiplied RGBA8 color.
    Rgba8Premul,
    /// Single-channel full-precision depth.
    R32Float,
}

impl PixelFormat {
    fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Premul | Self::R32Float => 4,
        }
    }
}

/// Handle to a pooled buffer. Stale handles (released or invalidated) are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
enum Storage {
    Color(Vec<u8>),
    Depth(Vec<f32>),
}

/// A pool-owned color or depth surface.
#[derive(Debug)]
pub struct OffscreenBuffer {
    id: BufferId,
    purpose: String,
    width: u32,
    height: u32,
    storage: Storage,
}

impl OffscreenBuffer {
    /// Pool handle of this buffer.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Purpose key the buffer was acquired under.
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Storage format.
    pub fn format(&self) -> PixelFormat {
        match self.storage {
            Storage::Color(_) => PixelFormat::Rgba8Premul,
            Storage::Depth(_) => PixelFormat::R32Float,
        }
    }

    /// Premultiplied RGBA8 bytes. Fails with `FormatMismatch` on a depth buffer.
    pub fn color(&self) -> PipelineResult<&[u8]> {
        match &self.storage {
            Storage::Color(px) => Ok(px),
            Storage::Depth(_) => Err(PipelineError::format_mismatch(format!(
                "buffer '{}' is depth-encoded, expected color",
                self.purpose
            ))),
        }
    }

    /// Mutable [`OffscreenBuffer::color`].
    pub fn color_mut(&mut self) -> PipelineResult<&mut [u8]> {
        match &mut self.storage {
            Storage::Color(px) => Ok(px),
            Storage::Depth(_) => Err(PipelineError::format_mismatch(format!(
                "buffer '{}' is depth-encoded, expected color",
                self.purpose
            ))),
        }
    }

    /// Encoded depth values. Fails with `FormatMismatch` on a color buffer.
    pub fn depth(&self) -> PipelineResult<&[f32]> {
        match &self.storage {
            Storage::Depth(d) => Ok(d),
            Storage::Color(_) => Err(PipelineError::format_mismatch(format!(
                "buffer '{}' is a color buffer, expected depth-encoded",
                self.purpose
            ))),
        }
    }

    /// Mutable [`OffscreenBuffer::depth`].
    pub fn depth_mut(&mut self) -> PipelineResult<&mut [f32]> {
        match &mut self.storage {
            Storage::Depth(d) => Ok(d),
            Storage::Color(_) => Err(PipelineError::format_mismatch(format!(
                "buffer '{}' is a color buffer, expected depth-encoded",
                self.purpose
            ))),
        }
    }

    /// Reset to transparent (color) or zero (depth).
    pub fn clear(&mut self) {
        match &mut self.storage {
            Storage::Color(px) => px.fill(0),
            Storage::Depth(d) => d.fill(0.0),
        }
    }
}

/// Pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BufferPoolOpts {
    /// Maximum bytes retained in idle buckets.
    pub max_pool_bytes: usize,
    /// Maximum idle buffers per (purpose, size, format) bucket.
    pub max_buffers_per_bucket: usize,
}

impl Default for BufferPoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 256 * 1024 * 1024,
            max_buffers_per_bucket: 8,
        }
    }
}

/// Pool counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Idle buffers kept for reuse.
    pub retained_buffers: usize,
    /// Bytes held by idle buffers.
    pub retained_bytes: usize,
    /// Buffers currently checked out.
    pub checked_out: usize,
    /// Fresh allocations.
    pub alloc_buffers: u64,
    /// Bytes of fresh allocations.
    pub alloc_bytes: u64,
    /// Acquires served from an idle bucket.
    pub reused: u64,
    /// Releases that dropped the buffer instead of retaining it.
    pub dropped_on_release: u64,
    /// Viewport changes that invalidated the pool.
    pub invalidations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    purpose: String,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl BucketKey {
    fn byte_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.format.bytes_per_pixel())
    }
}

#[derive(Debug)]
enum SlotState {
    Free,
    Idle,
    CheckedOut,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    /// Viewport epoch the buffer was allocated in.
    epoch: u64,
    state: SlotState,
    // `None` while free, or briefly while lent to a pass as its write target.
    buffer: Option<OffscreenBuffer>,
}

/// Reuses offscreen buffers keyed by purpose, dimensions and format.
///
/// A resize invalidates everything: idle buffers are dropped at once and checked-out buffers
/// are dropped when released. New buffers are allocated lazily by the next acquire.
#[derive(Debug)]
pub struct OffscreenBufferPool {
    opts: BufferPoolOpts,
    stats: BufferPoolStats,
    viewport: Option<Canvas>,
    epoch: u64,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    idle: HashMap<BucketKey, Vec<u32>>,
}

impl Default for OffscreenBufferPool {
    fn default() -> Self {
        Self::new(BufferPoolOpts::default())
    }
}

impl OffscreenBufferPool {
    /// Empty pool with the given limits.
    pub fn new(opts: BufferPoolOpts) -> Self {
        Self {
            opts,
            stats: BufferPoolStats::default(),
            viewport: None,
            epoch: 0,
            slots: Vec::new(),
            free_slots: Vec::new(),
            idle: HashMap::new(),
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> BufferPoolStats {
        self.stats.clone()
    }

    /// Viewport last passed to [`OffscreenBufferPool::resize`].
    pub fn viewport(&self) -> Option<Canvas> {
        self.viewport
    }

    /// Check out a buffer. Reuses an idle one with the same purpose, size and format,
    /// otherwise allocates. `wants_depth` selects the single-channel depth format.
    pub fn acquire(
        &mut self,
        purpose: &str,
        width: u32,
        height: u32,
        wants_depth: bool,
    ) -> PipelineResult<BufferId> {
        if width == 0 || height == 0 {
            return Err(PipelineError::validation(format!(
                "buffer '{purpose}' must be non-empty, got {width}x{height}"
            )));
        }
        let key = BucketKey {
            purpose: purpose.to_owned(),
            width,
            height,
            format: if wants_depth {
                PixelFormat::R32Float
            } else {
                PixelFormat::Rgba8Premul
            },
        };

        if let Some(index) = self.idle.get_mut(&key).and_then(Vec::pop) {
            let slot = &mut self.slots[index as usize];
            slot.state = SlotState::CheckedOut;
            self.stats.retained_buffers = self.stats.retained_buffers.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            self.stats.reused += 1;
            self.stats.checked_out += 1;
            return Ok(BufferId {
                index,
                generation: slot.generation,
            });
        }

        let bytes = key.byte_len();
        let px = (width as usize).saturating_mul(height as usize);
        let storage = match key.format {
            PixelFormat::Rgba8Premul => Storage::Color(vec![0; px.saturating_mul(4)]),
            PixelFormat::R32Float => Storage::Depth(vec![0.0; px]),
        };

        let index = match self.free_slots.pop() {
            Some(i) => i,
            None => {
                let i = u32::try_from(self.slots.len())
                    .map_err(|_| PipelineError::validation("buffer pool slot overflow"))?;
                self.slots.push(Slot {
                    generation: 0,
                    epoch: self.epoch,
                    state: SlotState::Free,
                    buffer: None,
                });
                i
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.epoch = self.epoch;
        slot.state = SlotState::CheckedOut;
        let id = BufferId {
            index,
            generation: slot.generation,
        };
        slot.buffer = Some(OffscreenBuffer {
            id,
            purpose: key.purpose,
            width,
            height,
            storage,
        });

        self.stats.alloc_buffers += 1;
        self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(bytes as u64);
        self.stats.checked_out += 1;
        tracing::debug!(purpose, width, height, depth = wants_depth, "allocated offscreen buffer");
        Ok(id)
    }

    /// Return a buffer. It is retained for reuse unless the pool limits are reached or it
    /// predates the last viewport change.
    pub fn release(&mut self, id: BufferId) -> PipelineResult<()> {
        let (key, slot_epoch) = {
            let slot = self.checked_out_slot(id)?;
            let buffer = slot
                .buffer
                .as_ref()
                .ok_or_else(|| PipelineError::aliasing("buffer released while bound to a pass"))?;
            let key = BucketKey {
                purpose: buffer.purpose.clone(),
                width: buffer.width,
                height: buffer.height,
                format: buffer.format(),
            };
            (key, slot.epoch)
        };
        let bytes = key.byte_len();
        self.stats.checked_out = self.stats.checked_out.saturating_sub(1);

        let bucket_len = self.idle.get(&key).map_or(0, Vec::len);
        let keep = slot_epoch == self.epoch
            && self.opts.max_pool_bytes > 0
            && self.opts.max_buffers_per_bucket > 0
            && self.stats.retained_bytes.saturating_add(bytes) <= self.opts.max_pool_bytes
            && bucket_len < self.opts.max_buffers_per_bucket;

        let slot = &mut self.slots[id.index as usize];
        if keep {
            slot.state = SlotState::Idle;
            self.idle.entry(key).or_default().push(id.index);
            self.stats.retained_buffers += 1;
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
        } else {
            slot.state = SlotState::Free;
            slot.buffer = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_slots.push(id.index);
            self.stats.dropped_on_release += 1;
        }
        Ok(())
    }

    /// Record the viewport size. A change invalidates every buffer; returns whether it did.
    pub fn resize(&mut self, viewport: Canvas) -> bool {
        if self.viewport == Some(viewport) {
            return false;
        }
        self.viewport = Some(viewport);
        self.invalidate();
        true
    }

    /// Drop idle buffers and mark checked-out ones for dropping on release.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        for indices in self.idle.values() {
            for &i in indices {
                let slot = &mut self.slots[i as usize];
                slot.state = SlotState::Free;
                slot.buffer = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_slots.push(i);
            }
        }
        self.idle.clear();
        self.stats.retained_buffers = 0;
        self.stats.retained_bytes = 0;
        self.stats.invalidations += 1;
        tracing::debug!(
            checked_out = self.stats.checked_out,
            "offscreen buffer pool invalidated"
        );
    }

    fn checked_out_slot(&mut self, id: BufferId) -> PipelineResult<&mut Slot> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot)
                if slot.generation == id.generation
                    && matches!(slot.state, SlotState::CheckedOut) =>
            {
                Ok(slot)
            }
            _ => Err(PipelineError::validation(format!(
                "stale or unknown buffer handle {id:?}"
            ))),
        }
    }

    /// Borrow a checked-out buffer.
    pub fn get(&self, id: BufferId) -> PipelineResult<&OffscreenBuffer> {
        match self.slots.get(id.index as usize) {
            Some(slot)
                if slot.generation == id.generation
                    && matches!(slot.state, SlotState::CheckedOut) =>
            {
                slot.buffer.as_ref().ok_or_else(|| {
                    PipelineError::aliasing(format!("buffer {id:?} is bound as a pass output"))
                })
            }
            _ => Err(PipelineError::validation(format!(
                "stale or unknown buffer handle {id:?}"
            ))),
        }
    }

    /// Mutably borrow a checked-out buffer.
    pub fn get_mut(&mut self, id: BufferId) -> PipelineResult<&mut OffscreenBuffer> {
        let slot = self.checked_out_slot(id)?;
        slot.buffer.as_mut().ok_or_else(|| {
            PipelineError::aliasing(format!("buffer {id:?} is bound as a pass output"))
        })
    }

    /// Run `f` with shared access to `reads` and exclusive access to `write`.
    ///
    /// Fails with `Aliasing` if `write` is also listed in `reads`.
    pub fn with_pass_buffers<R>(
        &mut self,
        reads: &[BufferId],
        write: BufferId,
        f: impl FnOnce(&[&OffscreenBuffer], &mut OffscreenBuffer) -> PipelineResult<R>,
    ) -> PipelineResult<R> {
        if reads.contains(&write) {
            return Err(PipelineError::aliasing(format!(
                "buffer {write:?} is both read and written by one pass"
            )));
        }

        let mut out = self
            .checked_out_slot(write)?
            .buffer
            .take()
            .ok_or_else(|| PipelineError::aliasing(format!("buffer {write:?} already bound")))?;

        let result = (|| {
            let mut inputs = Vec::with_capacity(reads.len());
            for &id in reads {
                inputs.push(self.get(id)?);
            }
            f(&inputs, &mut out)
        })();

        self.slots[write.index as usize].buffer = Some(out);
        result
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/buffer_pool.rs"]
mod tests;
