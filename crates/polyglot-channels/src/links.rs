//! Channel → language bindings, persisted as `{channelId: {lang, sink}}`.

use polyglot_core::entry::ChannelLink;
use polyglot_core::error::PolyglotError;
use polyglot_core::{persist, Lang};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// Registry of linked channels. At most one link per channel.
#[derive(Debug)]
pub struct ChannelLinks {
    path: PathBuf,
    links: RwLock<BTreeMap<String, ChannelLink>>,
}

impl ChannelLinks {
    /// Load links from `path`. A missing file means no links.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PolyglotError> {
        let path = path.into();
        let links: BTreeMap<String, ChannelLink> = persist::load_json(&path)
            .map_err(|e| PolyglotError::Channel(format!("failed to load channel links: {e}")))?;
        info!("links: {} channels from {}", links.len(), path.display());
        Ok(Self {
            path,
            links: RwLock::new(links),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of every link.
    pub async fn get_links(&self) -> BTreeMap<String, ChannelLink> {
        self.links.read().await.clone()
    }

    pub async fn get(&self, channel_id: &str) -> Option<ChannelLink> {
        self.links.read().await.get(channel_id).cloned()
    }

    /// Bind `channel_id` to `lang`, replacing any existing link. Returns the
    /// previous link.
    pub async fn link(
        &self,
        channel_id: &str,
        lang: Lang,
        sink: &str,
    ) -> Result<Option<ChannelLink>, PolyglotError> {
        if sink.trim().is_empty() {
            return Err(PolyglotError::Channel("sink endpoint cannot be empty".into()));
        }
        let mut links = self.links.write().await;
        let mut next = links.clone();
        let previous = next.insert(
            channel_id.to_string(),
            ChannelLink {
                lang,
                sink: sink.to_string(),
            },
        );
        save(&self.path, &next).await?;
        *links = next;
        info!("links: {channel_id} linked as {lang}");
        Ok(previous)
    }

    /// Remove the link for `channel_id`. Returns `None` when it was not linked.
    pub async fn unlink(&self, channel_id: &str) -> Result<Option<ChannelLink>, PolyglotError> {
        let mut links = self.links.write().await;
        if !links.contains_key(channel_id) {
            return Ok(None);
        }
        let mut next = links.clone();
        let removed = next.remove(channel_id);
        save(&self.path, &next).await?;
        *links = next;
        info!("links: {channel_id} unlinked");
        Ok(removed)
    }
}

/// Atomic save on the blocking pool.
async fn save(path: &Path, links: &BTreeMap<String, ChannelLink>) -> Result<(), PolyglotError> {
    let path = path.to_path_buf();
    let links = links.clone();
    tokio::task::spawn_blocking(move || persist::save_json(&path, &links))
        .await
        .map_err(|e| PolyglotError::Channel(format!("links save task failed: {e}")))?
}
