/// Result alias used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the compositing pipeline.
///
/// Nothing in this crate falls back to defaults on a bad input; every failure ends up here and
/// the caller decides whether to present the unshaded source, skip the layer, or halt.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A shader id could not be loaded from the program source.
    #[error("shader not found: {0}")]
    NotFound(String),

    /// The loaded program bytes are not a valid program.
    #[error("shader compile error: {0}")]
    Compile(String),

    /// A parameter value does not match its declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A parameter name is not declared by the program.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A scalar parameter lies outside its declared `min`/`max`.
    #[error("parameter out of range: {0}")]
    OutOfRange(String),

    /// A required stack slot could not be resolved for a target.
    #[error("shader resolution error for target '{target}', shader '{shader}': {source}")]
    ShaderResolution {
        /// Target whose composite was aborted.
        target: String,
        /// Shader id that failed to resolve.
        shader: String,
        /// Underlying resolution failure.
        #[source]
        source: Box<PipelineError>,
    },

    /// A color-format buffer was used where a depth-encoded one is required (or vice versa).
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// A pass would read from and write to the same buffer.
    #[error("aliasing error: {0}")]
    Aliasing(String),

    /// Invalid configuration or structural input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid timeline or animation request.
    #[error("animation error: {0}")]
    Animation(String),

    /// Failure while executing a pass.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Anything else, preserving the source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Build a [`PipelineError::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`PipelineError::Compile`].
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    /// Build a [`PipelineError::TypeMismatch`].
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Build a [`PipelineError::UnknownParameter`].
    pub fn unknown_parameter(msg: impl Into<String>) -> Self {
        Self::UnknownParameter(msg.into())
    }

    /// Build a [`PipelineError::OutOfRange`].
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Wrap a slot failure into a stack-level [`PipelineError::ShaderResolution`].
    pub fn shader_resolution(
        target: impl Into<String>,
        shader: impl Into<String>,
        source: PipelineError,
    ) -> Self {
        Self::ShaderResolution {
            target: target.into(),
            shader: shader.into(),
            source: Box::new(source),
        }
    }

    /// Build a [`PipelineError::FormatMismatch`].
    pub fn format_mismatch(msg: impl Into<String>) -> Self {
        Self::FormatMismatch(msg.into())
    }

    /// Build a [`PipelineError::Aliasing`].
    pub fn aliasing(msg: impl Into<String>) -> Self {
        Self::Aliasing(msg.into())
    }

    /// Build a [`PipelineError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PipelineError::Animation`].
    pub fn animation(msg: impl Into<String>) -> Self {
        Self::Animation(msg.into())
    }

    /// Build a [`PipelineError::Evaluation`].
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
