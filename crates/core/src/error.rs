/// Result alias that carries the custom [`InstrumentError`] type.
pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Common error type for the core crate.
///
/// Only the outer boundaries (configuration files, image files, WAV output
/// and backend start-up) produce errors. Grid lookups, sound mapping and
/// voice commands degrade silently instead.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The image could not be opened or decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Writing rendered audio failed.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    /// The audio backend could not be started.
    #[error("audio backend unavailable: {0}")]
    Backend(String),
    /// Caller supplied data the operation cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl InstrumentError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for InstrumentError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for InstrumentError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
