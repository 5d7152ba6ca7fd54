use thiserror::Error;

/// Recoverable failures raised by the canvas model and controller.
///
/// Malformed AI output never shows up here: the normalizer degrades to a
/// fallback diagram instead of failing.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("connection '{connection}' references unknown node '{node}'")]
    DanglingReference { connection: String, node: String },

    #[error("duplicate element id '{0}'")]
    DuplicateId(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("unknown connection '{0}'")]
    UnknownConnection(String),

    #[error("a diagram generation request is already in flight")]
    GenerationInProgress,

    #[error("no diagram generation request is in flight")]
    GenerationNotStarted,

    #[error("canvas snapshot could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CanvasResult<T> = std::result::Result<T, CanvasError>;
