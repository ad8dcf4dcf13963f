use thiserror::Error;

/// Top-level error type for Habitual.
#[derive(Debug, Clone, Error)]
pub enum HabitualError {
    /// A habit or reminder referenced by the caller no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external call (delivery, membership authority) failed or timed out.
    /// Retried on the owning component's next natural cycle, never immediately.
    #[error("transient error: {0}")]
    Transient(String),

    /// A programming-contract failure, e.g. a cancelled timer that still fired.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Caller supplied a value outside the accepted domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HabitualError {
    /// Whether the failure is expected to clear up on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Channel(_))
    }
}

impl From<std::io::Error> for HabitualError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for HabitualError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
