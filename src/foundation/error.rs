/// Convenience result type used across the engine.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid caller input: spans, playhead values, clip placement, hierarchy misuse.
    #[error("validation error: {0}")]
    Validation(String),

    /// Parameter, sequence or keyframe misuse (type mismatch, unknown parameter, ownership).
    #[error("automation error: {0}")]
    Automation(String),

    /// Errors raised while preparing, drawing or compositing a frame.
    #[error("render error: {0}")]
    Render(String),

    /// Errors when encoding or decoding persisted data.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from collaborators or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::Automation`] value.
    pub fn automation(msg: impl Into<String>) -> Self {
        Self::Automation(msg.into())
    }

    /// Build a [`ReelError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`ReelError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<std::io::Error> for ReelError {
    fn from(e: std::io::Error) -> Self {
        Self::Serde(format!("io: {e}"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
