use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShaderError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl ShaderError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ShaderError {}

impl From<ShaderError> for crate::foundation::error::PipelineError {
    fn from(e: ShaderError) -> Self {
        Self::compile(e.to_string())
    }
}
