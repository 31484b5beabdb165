//! Broadcast router: fan a resolution out to linked channels.

use polyglot_core::{
    entry::ChannelLink,
    message::{Author, Delivery},
    traits::Sink,
    Lang,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Deliveries for every link whose language differs from `src` and has a
/// translation. Channels without one are skipped silently.
pub fn route(
    translations: &BTreeMap<Lang, String>,
    src: Lang,
    links: &BTreeMap<String, ChannelLink>,
    author: Option<&Author>,
) -> Vec<Delivery> {
    links
        .iter()
        .filter(|(_, link)| link.lang != src)
        .filter_map(|(channel_id, link)| match translations.get(&link.lang) {
            Some(text) => Some(Delivery {
                sink: link.sink.clone(),
                text: text.clone(),
                author: author.cloned(),
            }),
            None => {
                debug!("broadcast: no {} text for channel {channel_id}, skipping", link.lang);
                None
            }
        })
        .collect()
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Endpoints whose delivery returned an error.
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Deliver concurrently. One sink failing never blocks the others.
pub async fn broadcast(sink: Arc<dyn Sink>, deliveries: Vec<Delivery>) -> DeliveryReport {
    let mut set = JoinSet::new();
    for delivery in deliveries {
        let sink = sink.clone();
        set.spawn(async move {
            let res = sink.deliver(&delivery).await;
            (delivery.sink, res)
        });
    }

    let mut report = DeliveryReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.delivered += 1,
            Ok((endpoint, Err(e))) => {
                warn!("broadcast: delivery via {} failed: {e}", sink.name());
                report.failed.push(endpoint);
            }
            Err(e) => warn!("broadcast: delivery task failed: {e}"),
        }
    }
    report
}
