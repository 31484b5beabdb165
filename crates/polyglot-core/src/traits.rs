use crate::{
    error::PolyglotError,
    lang::Lang,
    message::{Delivery, IncomingEvent, OutgoingMessage},
};
use async_trait::async_trait;

/// External machine translation capability.
///
/// Treated as a black box: one attempt per call, the caller bounds it
/// with a timeout.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Translate `text` from `source` into `target`.
    async fn translate(&self, text: &str, source: Lang, target: Lang)
        -> Result<String, PolyglotError>;
}

/// Delivery endpoint for broadcast text.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message. Failures are local to this delivery.
    async fn deliver(&self, delivery: &Delivery) -> Result<(), PolyglotError>;
}

/// Inbound event source bridging to the chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening. Returns a receiver that yields inbound events.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingEvent>, PolyglotError>;

    /// Send a reply back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), PolyglotError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), PolyglotError>;
}
