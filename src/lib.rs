//! Layered shader compositing for 2D tile renderers.
//!
//! A target (a named layer or a single object) carries an ordered [`ShaderStack`]. Each frame
//! the pipeline:
//!
//! - resolves the stack's programs through a [`ShaderProgramCache`],
//! - commits only the dirty parameters from the [`ParameterStore`],
//! - runs one pass per slot over buffers from the [`OffscreenBufferPool`], handing each
//!   output to the next pass as both its input and its "previous output".
//!
//! [`ShaderPipeline`] owns these services and sequences update and render phases.
//! [`CpuBackend`] is the reference [`PassBackend`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod animation;
pub(crate) mod params;
pub(crate) mod program;
pub(crate) mod render;
pub(crate) mod session;
pub(crate) mod shader;

pub use crate::foundation::core::{Canvas, Rgba8Premul, ShaderId, TargetId};
pub use crate::foundation::error::{PipelineError, PipelineResult};

pub use crate::animation::animator::{ParameterAnimator, TimelineId};
pub use crate::animation::ease::Ease;
pub use crate::animation::timeline::{Keyframe, Timeline, TimelineState};
pub use crate::params::notify::{ChangeNotifier, ParameterChanged, SubscriptionId};
pub use crate::params::store::{ParamBlockKey, ParameterStore, SetOutcome, StoreStats};
pub use crate::program::cache::{CacheStats, DEFAULT_CACHE_CAPACITY, EvictOutcome, ShaderProgramCache};
pub use crate::program::definition::{
    ProgramDefinition, ProgramHandle, ProgramLibrary, ProgramSource, ShaderProgram,
};
pub use crate::program::schema::{
    MATRIX_TRANSFORM, ParamDecl, ParamSchema, RESERVED_PARAMETERS, SCREEN_SIZE, SOURCE_TEXTURE,
    is_reserved,
};
pub use crate::program::value::{ParamType, ParameterValue, TextureRef};
pub use crate::render::backend::{FrameRGBA, PassBackend, PassBlend, PassDesc};
pub use crate::render::buffer_pool::{
    BufferId, BufferPoolOpts, BufferPoolStats, OffscreenBuffer, OffscreenBufferPool, PixelFormat,
};
pub use crate::render::compositor::{Composite, CompositeStats, StackCompositor};
pub use crate::render::cpu::{CpuBackend, CpuBackendOpts, CpuBackendStats};
pub use crate::render::depth::{DepthCompositor, DepthEncoding, DepthTargets};
pub use crate::render::stack::{BlendMode, ShaderSlot, ShaderStack};
pub use crate::session::config::PipelineOpts;
pub use crate::session::feed::{ApplyReport, ParameterOverride, TargetShading};
pub use crate::session::pipeline::{LayerInput, ShaderPipeline};
