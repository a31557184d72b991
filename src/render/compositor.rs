use crate::foundation::core::{ShaderId, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::params::notify::ChangeNotifier;
use crate::params::store::{ParamBlockKey, ParameterStore};
use crate::program::cache::ShaderProgramCache;
use crate::program::definition::{ProgramHandle, ProgramSource};
use crate::render::backend::{FrameRGBA, PassBackend, PassBlend, PassDesc};
use crate::render::buffer_pool::{BufferId, OffscreenBufferPool, PixelFormat};
use crate::render::stack::{BlendMode, ShaderSlot, ShaderStack};

const SOURCE_PURPOSE: &str = "stack.source";
const PASS_PURPOSE: &str = "stack.pass";

/// Counters for one composite call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeStats {
    /// Passes actually executed.
    pub passes_executed: u32,
    /// Slots skipped because an optional stack could not resolve them.
    pub slots_skipped: u32,
    /// Backend parameter writes issued by commits.
    pub parameter_writes: u32,
}

/// Final image of one stack plus what it cost.
#[derive(Clone, Debug)]
pub struct Composite {
    /// Composited, premultiplied result.
    pub frame: FrameRGBA,
    /// Work done to produce it.
    pub stats: CompositeStats,
}

/// Buffers checked out by a running composite, released whether it succeeds or not.
struct Chain {
    held: Vec<BufferId>,
    stats: CompositeStats,
}

struct ResolvedSlot<'s> {
    slot: &'s ShaderSlot,
    program: ProgramHandle,
    blend: Option<(ProgramHandle, ParamBlockKey)>,
}

/// Runs a [`ShaderStack`] as a chain of passes over a source image.
///
/// Every pass reads the previous pass output and writes a freshly acquired, cleared buffer.
/// The rolling input and the "previous output" bound for blending are always the same buffer:
/// the one the last pass wrote.
pub struct StackCompositor<'a, S> {
    cache: &'a mut ShaderProgramCache<S>,
    pool: &'a mut OffscreenBufferPool,
    store: &'a mut ParameterStore,
    notifier: &'a mut ChangeNotifier,
}

impl<'a, S: ProgramSource> StackCompositor<'a, S> {
    /// Borrow the services a composite needs.
    pub fn new(
        cache: &'a mut ShaderProgramCache<S>,
        pool: &'a mut OffscreenBufferPool,
        store: &'a mut ParameterStore,
        notifier: &'a mut ChangeNotifier,
    ) -> Self {
        Self {
            cache,
            pool,
            store,
            notifier,
        }
    }

    /// Composite `source` through `stack`.
    ///
    /// An empty stack returns the source unchanged. Every referenced program is resolved (and
    /// pinned for the frame) before any pass runs. When one cannot be resolved the whole call
    /// fails with `ShaderResolution`, unless the stack is optional, in which case the slot is
    /// skipped with a warning. `depth` is the layer's depth companion, if it has one.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(target_id = %stack.target(), slots = stack.len())
    )]
    pub fn composite<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stack: &ShaderStack,
        source: &FrameRGBA,
        depth: Option<BufferId>,
    ) -> PipelineResult<Composite> {
        let mut stats = CompositeStats::default();
        if stack.is_empty() {
            return Ok(Composite {
                frame: source.clone(),
                stats,
            });
        }

        let resolved = self.resolve_stack(stack, depth, &mut stats)?;
        if resolved.is_empty() {
            return Ok(Composite {
                frame: source.clone(),
                stats,
            });
        }

        source.validate()?;
        let src = self
            .pool
            .acquire(SOURCE_PURPOSE, source.width, source.height, false)?;
        let mut chain = Chain {
            held: vec![src],
            stats,
        };
        let result = match backend.upload(self.pool, src, source) {
            Ok(()) => self.run_passes(backend, stack.target(), &resolved, src, depth, &mut chain),
            Err(e) => Err(e),
        };

        let mut release_err = None;
        for id in chain.held {
            if let Err(e) = self.pool.release(id) {
                release_err.get_or_insert(e);
            }
        }
        let frame = result?;
        if let Some(e) = release_err {
            return Err(e);
        }
        Ok(Composite {
            frame,
            stats: chain.stats,
        })
    }

    fn resolve_stack<'s>(
        &mut self,
        stack: &'s ShaderStack,
        depth: Option<BufferId>,
        stats: &mut CompositeStats,
    ) -> PipelineResult<Vec<ResolvedSlot<'s>>> {
        if let Some(depth) = depth {
            let format = self.pool.get(depth)?.format();
            if format != PixelFormat::R32Float {
                return Err(PipelineError::format_mismatch(format!(
                    "depth companion for {} is {format:?}, expected R32Float",
                    stack.target()
                )));
            }
        }

        let mut resolved = Vec::with_capacity(stack.len());
        for slot in stack.slots() {
            match self.resolve_slot(stack.target(), slot) {
                Ok(r) => {
                    if depth.is_none() && r.program.reads_depth() {
                        return Err(PipelineError::validation(format!(
                            "'{}' samples depth but {} has no depth companion",
                            slot.shader,
                            stack.target()
                        )));
                    }
                    resolved.push(r);
                }
                Err((shader, e)) if stack.is_optional() => {
                    tracing::warn!(
                        target_id = %stack.target(),
                        shader = %shader,
                        order = slot.order,
                        error = %e,
                        "skipping unresolvable slot of optional stack"
                    );
                    stats.slots_skipped += 1;
                }
                Err((shader, e)) => {
                    return Err(PipelineError::shader_resolution(
                        stack.target().to_string(),
                        shader.to_string(),
                        e,
                    ));
                }
            }
        }
        Ok(resolved)
    }

    fn resolve_slot<'s>(
        &mut self,
        target: &TargetId,
        slot: &'s ShaderSlot,
    ) -> Result<ResolvedSlot<'s>, (ShaderId, PipelineError)> {
        let program = self
            .cache
            .resolve_pinned(&slot.shader)
            .map_err(|e| (slot.shader.clone(), e))?;
        let blend = match &slot.blend {
            BlendMode::Custom(id) => {
                let p = self
                    .cache
                    .resolve_pinned(id)
                    .map_err(|e| (id.clone(), e))?;
                let key = ParamBlockKey::new(target.clone(), id.clone());
                Some((p, key))
            }
            _ => None,
        };
        Ok(ResolvedSlot {
            slot,
            program,
            blend,
        })
    }

    fn run_passes<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: &TargetId,
        resolved: &[ResolvedSlot<'_>],
        src: BufferId,
        depth: Option<BufferId>,
        chain: &mut Chain,
    ) -> PipelineResult<FrameRGBA> {
        let (width, height) = {
            let buf = self.pool.get(src)?;
            (buf.width(), buf.height())
        };

        let mut current = src;
        let mut previous: Option<BufferId> = None;

        for r in resolved {
            let output = self.pool.acquire(PASS_PURPOSE, width, height, false)?;
            chain.held.push(output);
            backend.clear(self.pool, output)?;

            backend.bind_program(&r.program)?;
            let writes = self.store.commit(target, &r.program, backend, self.notifier)?;
            chain.stats.parameter_writes += writes as u32;
            if let Some((blend_program, _)) = &r.blend {
                let writes = self.store.commit(target, blend_program, backend, self.notifier)?;
                chain.stats.parameter_writes += writes as u32;
            }

            let block = ParamBlockKey::new(target.clone(), r.program.id().clone());
            let blend = match (&r.slot.blend, &r.blend) {
                (BlendMode::Replace, _) => PassBlend::Replace,
                (BlendMode::Additive, _) => PassBlend::Additive,
                (BlendMode::Multiply, _) => PassBlend::Multiply,
                (BlendMode::Custom(_), Some((program, blend_block))) => PassBlend::Custom {
                    program,
                    block: blend_block,
                },
                (BlendMode::Custom(id), None) => {
                    return Err(PipelineError::evaluation(format!(
                        "blend program '{id}' was not resolved"
                    )));
                }
            };
            let bind_previous = r.slot.blend.reads_previous() || r.program.reads_previous();

            backend.exec_pass(
                &PassDesc {
                    block: &block,
                    program: &r.program,
                    input: current,
                    previous: if bind_previous { previous } else { None },
                    depth,
                    output,
                    blend,
                },
                self.pool,
            )?;
            chain.stats.passes_executed += 1;

            // `current` and `previous` both name the last output, so one release covers both.
            let done = current;
            current = output;
            previous = Some(output);
            if done != src {
                self.pool.release(done)?;
                chain.held.retain(|&id| id != done);
            }
        }

        backend.readback(self.pool, current)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
