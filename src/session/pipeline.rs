use std::collections::HashMap;

use crate::animation::animator::{ParameterAnimator, TimelineId};
use crate::animation::timeline::Timeline;
use crate::foundation::core::{Canvas, Rgba8Premul, ShaderId, TargetId};
use crate::foundation::error::PipelineResult;
use crate::params::notify::{ChangeNotifier, ParameterChanged, SubscriptionId};
use crate::params::store::{ParameterStore, SetOutcome};
use crate::program::cache::ShaderProgramCache;
use crate::program::definition::ProgramSource;
use crate::program::schema::{SCREEN_SIZE, is_reserved};
use crate::program::value::ParameterValue;
use crate::render::backend::{FrameRGBA, PassBackend};
use crate::render::buffer_pool::{BufferId, OffscreenBufferPool};
use crate::render::compositor::{Composite, StackCompositor};
use crate::render::depth::{DepthCompositor, DepthTargets};
use crate::render::stack::{BlendMode, ShaderStack};
use crate::session::config::PipelineOpts;
use crate::session::feed::{ApplyReport, TargetShading};

/// One layer handed to [`ShaderPipeline::composite_layers`].
#[derive(Clone, Copy, Debug)]
pub struct LayerInput<'a> {
    /// Stack to run.
    pub stack: &'a ShaderStack,
    /// Unshaded source image.
    pub source: &'a FrameRGBA,
    /// Depth companion, usually from [`ShaderPipeline::depth_texture`].
    pub depth: Option<BufferId>,
}

/// Owns the services of the compositing pipeline and sequences a frame.
///
/// A frame is an update phase ([`ShaderPipeline::apply_target`], [`ShaderPipeline::set_parameter`],
/// [`ShaderPipeline::update`]) followed by a render phase (the `composite_*` calls) and closed
/// by [`ShaderPipeline::end_frame`].
pub struct ShaderPipeline<S> {
    opts: PipelineOpts,
    cache: ShaderProgramCache<S>,
    pool: OffscreenBufferPool,
    store: ParameterStore,
    notifier: ChangeNotifier,
    animator: ParameterAnimator,
    depth: DepthCompositor,
    stacks: HashMap<TargetId, ShaderStack>,
    viewport: Option<Canvas>,
    frame: u64,
}

impl<S: ProgramSource> ShaderPipeline<S> {
    /// Build a pipeline resolving programs through `source`.
    pub fn new(source: S, opts: PipelineOpts) -> PipelineResult<Self> {
        opts.validate()?;
        Ok(Self {
            cache: ShaderProgramCache::new(source, opts.cache_capacity)?,
            pool: OffscreenBufferPool::new(opts.pool),
            store: ParameterStore::new(),
            notifier: ChangeNotifier::new(),
            animator: ParameterAnimator::new(),
            depth: DepthCompositor::new(opts.depth)?,
            stacks: HashMap::new(),
            viewport: None,
            frame: 0,
            opts,
        })
    }

    /// Active settings.
    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// Program cache.
    pub fn cache(&self) -> &ShaderProgramCache<S> {
        &self.cache
    }

    /// Program cache, for explicit eviction.
    pub fn cache_mut(&mut self) -> &mut ShaderProgramCache<S> {
        &mut self.cache
    }

    /// Buffer pool.
    pub fn pool(&self) -> &OffscreenBufferPool {
        &self.pool
    }

    /// Buffer pool, for callers that prepare their own companions.
    pub fn pool_mut(&mut self) -> &mut OffscreenBufferPool {
        &mut self.pool
    }

    /// Parameter store.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Animator.
    pub fn animator(&self) -> &ParameterAnimator {
        &self.animator
    }

    /// Current viewport.
    pub fn viewport(&self) -> Option<Canvas> {
        self.viewport
    }

    /// Frames closed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Stack registered for `target` by [`ShaderPipeline::apply_target`].
    pub fn stack(&self, target: &TargetId) -> Option<&ShaderStack> {
        self.stacks.get(target)
    }

    /// Update the logical screen size. Invalidates pooled buffers when it changes and returns
    /// whether it did. `ScreenSize` reaches programs on their next commit.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> PipelineResult<bool> {
        let canvas = Canvas::new(width, height)?;
        let changed = self.pool.resize(canvas);
        self.viewport = Some(canvas);
        if changed {
            tracing::debug!(width, height, "viewport changed");
        }
        Ok(changed)
    }

    /// Subscribe to committed parameter changes.
    pub fn subscribe(&mut self, f: impl FnMut(&ParameterChanged) + 'static) -> SubscriptionId {
        self.notifier.subscribe(f)
    }

    /// Drop a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Override one parameter of `shader` on `target`. Validation errors surface here.
    pub fn set_parameter(
        &mut self,
        target: &TargetId,
        shader: &ShaderId,
        name: &str,
        value: ParameterValue,
    ) -> PipelineResult<SetOutcome> {
        let program = self.cache.resolve(shader)?;
        self.store.set(target, &program, name, value)
    }

    /// Take the component feed for one target: register its stack and apply its overrides.
    ///
    /// Every override is validated before any is stored, so a bad one leaves the target's
    /// state untouched.
    pub fn apply_target(&mut self, shading: TargetShading) -> PipelineResult<ApplyReport> {
        let target = shading.target().clone();
        let mut programs = Vec::with_capacity(shading.overrides.len());
        for o in &shading.overrides {
            let program = self.cache.resolve(&o.shader)?;
            if !is_reserved(&o.name) {
                program.schema().validate(&o.name, &o.value)?;
            }
            programs.push(program);
        }

        let mut report = ApplyReport::default();
        for (o, program) in shading.overrides.into_iter().zip(programs) {
            match self.store.set(&target, &program, &o.name, o.value)? {
                SetOutcome::Stored => report.stored += 1,
                SetOutcome::IgnoredReserved => report.ignored_reserved += 1,
            }
        }
        self.stacks.insert(target, shading.stack);
        Ok(report)
    }

    /// Animate `param` of `shader` on `target`, replacing any timeline already on it.
    pub fn start_animation(
        &mut self,
        target: &TargetId,
        shader: &ShaderId,
        param: &str,
        timeline: Timeline,
    ) -> PipelineResult<TimelineId> {
        let program = self.cache.resolve(shader)?;
        self.animator.start(target, &program, param, timeline)
    }

    /// Stop a timeline; its last value stays in place.
    pub fn stop_animation(&mut self, id: TimelineId) -> bool {
        self.animator.stop(id)
    }

    /// Tear down everything owned by `target`: stack, parameter blocks, the backend's copies
    /// of them, timelines and any open depth pass.
    pub fn destroy_target<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: &TargetId,
    ) -> PipelineResult<()> {
        self.stacks.remove(target);
        backend.forget_target(target);
        let blocks = self.store.remove_target(target);
        let timelines = self.animator.destroy_target(target);
        tracing::debug!(target_id = %target, blocks, timelines, "destroyed target");
        self.depth.release(&mut self.pool, target)
    }

    /// Update phase: advance animations by `dt` seconds. Returns the number of values written.
    #[tracing::instrument(level = "debug", skip(self), fields(frame = self.frame))]
    pub fn update(&mut self, dt: f32) -> PipelineResult<usize> {
        self.animator.tick(dt, &mut self.store)
    }

    /// Open a depth-encoded geometry pass for `target`.
    pub fn begin_depth_encoded_pass(
        &mut self,
        target: &TargetId,
        width: u32,
        height: u32,
    ) -> PipelineResult<DepthTargets> {
        self.depth
            .begin_depth_encoded_pass(&mut self.pool, target, width, height)
    }

    /// Draw one fragment into an open depth pass.
    pub fn encode_fragment(
        &mut self,
        target: &TargetId,
        x: u32,
        y: u32,
        color: Rgba8Premul,
        view_z: f32,
    ) -> PipelineResult<bool> {
        self.depth
            .encode_fragment(&mut self.pool, target, x, y, color, view_z)
    }

    /// Draw an image into an open depth pass at one depth.
    pub fn draw_depth_frame(
        &mut self,
        target: &TargetId,
        frame: &FrameRGBA,
        origin: [i32; 2],
        view_z: f32,
    ) -> PipelineResult<usize> {
        self.depth
            .draw_frame(&mut self.pool, target, frame, origin, view_z)
    }

    /// Finish the color side of a depth pass and return the geometry image.
    pub fn end_depth_pass(&mut self, target: &TargetId) -> PipelineResult<FrameRGBA> {
        self.depth.end_pass(&mut self.pool, target)
    }

    /// Depth companion of `target`, valid until [`ShaderPipeline::end_frame`].
    pub fn depth_texture(&self, target: &TargetId) -> PipelineResult<BufferId> {
        self.depth.get_depth_texture(target)
    }

    fn inject_screen_size(&mut self, stack: &ShaderStack) {
        let Some(viewport) = self.viewport else {
            return;
        };
        let size = ParameterValue::Vec2([viewport.width as f32, viewport.height as f32]);
        for slot in stack.slots() {
            let blend = match &slot.blend {
                BlendMode::Custom(id) => Some(id),
                _ => None,
            };
            for id in std::iter::once(&slot.shader).chain(blend) {
                // Resolution failures are reported by the composite itself.
                let Ok(program) = self.cache.resolve_pinned(id) else {
                    continue;
                };
                if let Err(e) = self
                    .store
                    .inject(stack.target(), &program, SCREEN_SIZE, size.clone())
                {
                    tracing::warn!(target_id = %stack.target(), shader = %id, error = %e, "ScreenSize rejected");
                }
            }
        }
    }

    /// Render phase: composite one layer through `stack`.
    pub fn composite_layer<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stack: &ShaderStack,
        source: &FrameRGBA,
        depth: Option<BufferId>,
    ) -> PipelineResult<Composite> {
        self.inject_screen_size(stack);
        StackCompositor::new(
            &mut self.cache,
            &mut self.pool,
            &mut self.store,
            &mut self.notifier,
        )
        .composite(backend, stack, source, depth)
    }

    /// Render phase: composite `target` through the stack registered by
    /// [`ShaderPipeline::apply_target`]. Targets without one pass through unchanged.
    pub fn composite_target<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: &TargetId,
        source: &FrameRGBA,
        depth: Option<BufferId>,
    ) -> PipelineResult<Composite> {
        let stack = match self.stacks.get(target) {
            Some(stack) => stack.clone(),
            None => ShaderStack::new(target.clone()),
        };
        self.composite_layer(backend, &stack, source, depth)
    }

    /// Render phase: composite independent layers. Each gets its own result; one failing
    /// never stops the others.
    pub fn composite_layers<B: PassBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layers: &[LayerInput<'_>],
    ) -> Vec<(TargetId, PipelineResult<Composite>)> {
        layers
            .iter()
            .map(|layer| {
                let result = self.composite_layer(backend, layer.stack, layer.source, layer.depth);
                if let Err(e) = &result {
                    tracing::warn!(target_id = %layer.stack.target(), error = %e, "layer composite failed");
                }
                (layer.stack.target().clone(), result)
            })
            .collect()
    }

    /// Close the frame: release depth passes, unpin programs and run deferred evictions.
    pub fn end_frame(&mut self) -> PipelineResult<()> {
        let released = self.depth.release_all(&mut self.pool);
        self.cache.end_frame();
        self.frame += 1;
        released
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
