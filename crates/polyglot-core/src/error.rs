use thiserror::Error;

/// Top-level error type for Polyglot.
#[derive(Debug, Error)]
pub enum PolyglotError {
    /// Error from an external translator.
    #[error("translator error: {0}")]
    Translator(String),

    /// Error from a channel, sink, or channel link registry.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Translation memory / storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
