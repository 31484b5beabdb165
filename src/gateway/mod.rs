//! Gateway: receives channel events and drives the resolve/broadcast flow.

mod learner;
pub mod pipeline;
pub mod routing;
#[cfg(test)]
mod tests;

pub use learner::LearningJob;
pub use pipeline::{Outcome, Pipeline, Resolution, Source};

use polyglot_channels::ChannelLinks;
use polyglot_core::{
    config::LearningConfig,
    message::{CorrectionRequest, IncomingEvent, IncomingMessage, OutgoingMessage},
    traits::{Channel, Sink},
};
use polyglot_memory::{Store, UsageLog};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The relay process.
pub struct Gateway {
    pipeline: Pipeline,
    store: Store,
    usage_log: Arc<UsageLog>,
    links: Arc<ChannelLinks>,
    channel: Arc<dyn Channel>,
    sink: Arc<dyn Sink>,
    learning: LearningConfig,
}

impl Gateway {
    pub fn new(
        pipeline: Pipeline,
        store: Store,
        usage_log: Arc<UsageLog>,
        links: Arc<ChannelLinks>,
        channel: Arc<dyn Channel>,
        sink: Arc<dyn Sink>,
        learning: LearningConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            usage_log,
            links,
            channel,
            sink,
            learning,
        }
    }

    /// Run until ctrl-c or until the channel closes its event stream.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let mut rx = self
            .channel
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start channel {}: {e}", self.channel.name()))?;

        info!(
            "Polyglot gateway running | channel: {} | sink: {} | links: {} | entries: {} | learning: {}",
            self.channel.name(),
            self.sink.name(),
            self.links.get_links().await.len(),
            self.store.len().await,
            if self.learning.enabled { "on" } else { "off" },
        );

        let learning = self.learning.enabled.then(|| {
            LearningJob::spawn(self.store.clone(), self.usage_log.clone(), self.learning)
        });

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        let gw = self.clone();
                        in_flight.spawn(async move { gw.handle_event(event).await });
                    }
                    None => {
                        info!("channel {} closed its event stream", self.channel.name());
                        break;
                    }
                },
                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = joined {
                        error!("gateway: event task failed: {e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(learning, in_flight).await;
        Ok(())
    }

    /// Stop intake, drain in-flight events, then stop the learner.
    async fn shutdown(&self, learning: Option<LearningJob>, mut in_flight: JoinSet<()>) {
        info!("Shutting down...");
        if let Err(e) = self.channel.stop().await {
            warn!("failed to stop channel {}: {e}", self.channel.name());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("gateway: event task failed: {e}");
            }
        }
        if let Some(job) = learning {
            job.stop().await;
        }
        info!("Shutdown complete.");
    }

    pub async fn handle_event(&self, event: IncomingEvent) {
        match event {
            IncomingEvent::Message(msg) => self.handle_message(msg).await,
            IncomingEvent::Correction(req) => self.handle_correction(req).await,
        }
    }

    async fn handle_message(&self, msg: IncomingMessage) {
        if msg.from_bot {
            debug!("gateway: ignoring relayed message {}", msg.id);
            return;
        }
        let text = msg.text.trim();
        if text.is_empty() {
            return;
        }
        let Some(link) = self.links.get(&msg.channel_id).await else {
            debug!("gateway: channel {} is not linked, ignoring", msg.channel_id);
            return;
        };

        let resolution = self.pipeline.resolve(text, link.lang, msg.timestamp).await;
        if let Some(ref e) = resolution.persist_error {
            warn!("gateway: translation for {} kept in memory only: {e}", msg.id);
        }
        match resolution.outcome() {
            Outcome::Empty => {
                warn!("gateway: no translation available for message {}", msg.id);
                return;
            }
            Outcome::Partial => {
                let missing: Vec<&str> = resolution.missing.iter().map(|l| l.as_str()).collect();
                info!("gateway: partial result for {}, missing {}", msg.id, missing.join(", "));
            }
            Outcome::Complete => {}
        }

        let links = self.links.get_links().await;
        let deliveries =
            routing::route(&resolution.translations, link.lang, &links, msg.author.as_ref());
        let report = routing::broadcast(self.sink.clone(), deliveries).await;
        info!(
            "broadcast: message {} from {} delivered to {}/{} channels",
            msg.id,
            msg.channel_id,
            report.delivered,
            report.attempted()
        );
    }

    async fn handle_correction(&self, req: CorrectionRequest) {
        let reply = match self.store.submit_correction(&req.original, &req.corrected).await {
            Ok(outcome) if outcome.updated => {
                format!("Correction saved to {} entries.", outcome.touched.len())
            }
            Ok(_) => "No stored translation matched; nothing changed.".to_string(),
            Err(e) => {
                error!("correction: failed to save: {e}");
                format!("Correction could not be saved: {e}")
            }
        };
        let out = OutgoingMessage {
            text: reply,
            reply_to: Some(req.id),
        };
        if let Err(e) = self.channel.send(out).await {
            error!("failed to send correction reply: {e}");
        }
    }
}
