use crate::assets::LoadFailure;

/// Result alias that carries the custom [`ResonanceError`] type.
pub type Result<T> = std::result::Result<T, ResonanceError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ResonanceError {
    /// Free-form message, mostly raised by event handlers supplied by callers.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed or serialised.
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),
    /// The configuration is well-formed but cannot be wired up.
    #[error("configuration error: {0}")]
    Config(String),
    /// A transition or debug write named a parameter nobody manages.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    /// A scalar value was routed to a color parameter or the other way round.
    #[error("parameter `{0}` does not accept this kind of value")]
    ValueMismatch(String),
    /// An asset fetch failed permanently.
    #[error(transparent)]
    Load(#[from] LoadFailure),
    /// The analyser was fed input it cannot process.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// FFT execution failed inside the spectrum analyser.
    #[error("fft failure: {0}")]
    Fft(#[from] realfft::FftError),
}

impl ResonanceError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ResonanceError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ResonanceError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
