/// Result alias that carries the custom [`GuitarError`] type.
pub type Result<T> = std::result::Result<T, GuitarError>;

/// Common error type for the core crate.
///
/// Every variant describes a local contract violation. Nothing in the core
/// retries; errors are surfaced straight to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GuitarError {
    /// Free-form failure, mostly poisoned shared state or a crashed worker.
    #[error("{0}")]
    Message(String),
    /// A caller handed in arguments that can never be valid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Zero, negative or non-finite pitch reached the synthesis engine.
    #[error("frequency must be positive and finite, got {0} Hz")]
    InvalidFrequency(f64),
    /// A buffer did not have the length the operation was sized for.
    #[error("buffer size mismatch: expected {expected} samples, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },
    #[error("unknown chord `{0}`")]
    UnknownChord(String),
    #[error("string index {0} is out of range (0..=5)")]
    InvalidString(usize),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl GuitarError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for GuitarError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for GuitarError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
