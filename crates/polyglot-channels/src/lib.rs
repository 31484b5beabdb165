//! # polyglot-channels
//!
//! Channel links, webhook delivery, and the inbound JSON-lines bridge.

pub mod bridge;
pub mod links;
pub mod webhook;

pub use bridge::LineBridge;
pub use links::ChannelLinks;
pub use webhook::WebhookSink;
