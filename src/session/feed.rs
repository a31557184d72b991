use crate::foundation::core::{ShaderId, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::value::ParameterValue;
use crate::render::stack::ShaderStack;

/// One parameter override from the component feed, merged over the program defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterOverride {
    /// Program the parameter belongs to.
    pub shader: ShaderId,
    /// Parameter name.
    pub name: String,
    /// New value.
    pub value: ParameterValue,
}

/// What the entity side attaches to one target for a frame: its stack and its overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetShading {
    /// Ordered stack for the target.
    pub stack: ShaderStack,
    /// Overrides applied before the target is composited.
    #[serde(default)]
    pub overrides: Vec<ParameterOverride>,
}

impl TargetShading {
    /// Shading with no overrides.
    pub fn new(stack: ShaderStack) -> Self {
        Self {
            stack,
            overrides: Vec::new(),
        }
    }

    /// Append an override.
    pub fn with_override(
        mut self,
        shader: impl Into<ShaderId>,
        name: impl Into<String>,
        value: ParameterValue,
    ) -> Self {
        self.overrides.push(ParameterOverride {
            shader: shader.into(),
            name: name.into(),
            value,
        });
        self
    }

    /// Target the stack is attached to.
    pub fn target(&self) -> &TargetId {
        self.stack.target()
    }

    /// Parse from JSON.
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        serde_json::from_str(s).map_err(|e| PipelineError::validation(format!("target shading: {e}")))
    }
}

/// Outcome of [`crate::ShaderPipeline::apply_target`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Overrides validated and stored.
    pub stored: usize,
    /// Overrides of pipeline-managed names, logged and dropped.
    pub ignored_reserved: usize,
}
