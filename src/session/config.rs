use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::cache::DEFAULT_CACHE_CAPACITY;
use crate::render::buffer_pool::BufferPoolOpts;
use crate::render::cpu::CpuBackendOpts;
use crate::render::depth::DepthEncoding;

/// Pipeline-wide settings. Every field has a default, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOpts {
    /// Resident program bound of the [`crate::ShaderProgramCache`].
    pub cache_capacity: usize,
    /// Offscreen buffer pool limits.
    pub pool: BufferPoolOpts,
    /// Depth encoding used by the depth-encoded geometry pass.
    pub depth: DepthEncoding,
    /// Let the CPU backend shade rows in parallel.
    pub parallel: bool,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            pool: BufferPoolOpts::default(),
            depth: DepthEncoding::default(),
            parallel: true,
        }
    }
}

impl PipelineOpts {
    /// Parse and validate a JSON config.
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        let opts: Self = serde_json::from_str(s)
            .map_err(|e| PipelineError::validation(format!("pipeline config: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.cache_capacity == 0 {
            return Err(PipelineError::validation("cache_capacity must be at least 1"));
        }
        self.depth.validate()
    }

    /// Options for a [`crate::CpuBackend`] matching this config.
    pub fn cpu_backend(&self) -> CpuBackendOpts {
        CpuBackendOpts {
            parallel: self.parallel,
        }
    }
}
