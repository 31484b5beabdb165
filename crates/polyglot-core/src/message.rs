use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display identity of the human who wrote a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A chat message arriving on a linked channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Platform-specific channel id. Looked up in the channel links.
    pub channel_id: String,
    #[serde(default)]
    pub author: Option<Author>,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Messages relayed by the bot itself are never re-broadcast.
    #[serde(default)]
    pub from_bot: bool,
}

/// A human-supplied better phrasing for a previously broadcast message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// The broadcast text as it was delivered.
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub reviewer: Option<String>,
}

/// Anything an inbound channel can hand to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingEvent {
    Message(IncomingMessage),
    Correction(CorrectionRequest),
}

/// A reply sent back through the inbound channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Id of the event this answers, if any.
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

/// One fan-out delivery to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub sink: String,
    pub text: String,
    #[serde(default)]
    pub author: Option<Author>,
}
