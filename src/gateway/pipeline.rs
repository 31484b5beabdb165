//! Resolution pipeline: memory lookup, translator fallback, registration.

use chrono::{DateTime, Utc};
use polyglot_core::{entry::UsageRecord, traits::Translator, Lang};
use polyglot_memory::{Store, UsageLog};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Where a resolution came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Adopted from an existing entry.
    Memory { entry_id: String },
    /// Produced by the external translator; `entry_id` is the registered entry.
    Translator { entry_id: Option<String> },
    /// Nothing matched and no translation was obtained.
    Unresolved,
}

/// How much of the requested language set a resolution covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Partial,
    Empty,
}

/// Multilingual result for one incoming text.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: Source,
    pub translations: BTreeMap<Lang, String>,
    /// Target languages with no translation available.
    pub missing: Vec<Lang>,
    /// Registration happened in memory but could not be saved.
    pub persist_error: Option<String>,
}

impl Resolution {
    pub fn outcome(&self) -> Outcome {
        if self.translations.is_empty() {
            Outcome::Empty
        } else if self.missing.is_empty() {
            Outcome::Complete
        } else {
            Outcome::Partial
        }
    }

    fn new(source: Source, src: Lang, translations: BTreeMap<Lang, String>) -> Self {
        let missing = src
            .others()
            .filter(|l| !translations.contains_key(l))
            .collect();
        Self {
            source,
            translations,
            missing,
            persist_error: None,
        }
    }
}

/// Lookup-then-fallback-then-register.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    translator: Option<Arc<dyn Translator>>,
    usage_log: Arc<UsageLog>,
    timeout: Duration,
    initial_confidence: f64,
}

impl Pipeline {
    pub fn new(
        store: Store,
        translator: Option<Arc<dyn Translator>>,
        usage_log: Arc<UsageLog>,
        timeout: Duration,
        initial_confidence: f64,
    ) -> Self {
        Self {
            store,
            translator,
            usage_log,
            timeout,
            initial_confidence,
        }
    }

    /// Resolve `text` written in `src` into every other supported language.
    pub async fn resolve(&self, text: &str, src: Lang, observed_at: DateTime<Utc>) -> Resolution {
        let resolution = match self.store.resolve_from_memory(text, src).await {
            Some(hit) => {
                debug!(
                    "pipeline: memory hit {} (similarity {:.3})",
                    hit.entry_id, hit.similarity
                );
                Resolution::new(
                    Source::Memory {
                        entry_id: hit.entry_id,
                    },
                    src,
                    hit.translations,
                )
            }
            None => self.fallback(text, src).await,
        };

        if !resolution.translations.is_empty() {
            self.log_usage(text, src, &resolution, observed_at).await;
        }
        resolution
    }

    async fn fallback(&self, text: &str, src: Lang) -> Resolution {
        let Some(translator) = self.translator.clone() else {
            debug!("pipeline: no memory match and no translator configured");
            return Resolution::new(Source::Unresolved, src, BTreeMap::new());
        };

        let mut calls = JoinSet::new();
        for target in src.others() {
            let translator = translator.clone();
            let text = text.to_string();
            let timeout = self.timeout;
            calls.spawn(async move {
                let res = tokio::time::timeout(timeout, translator.translate(&text, src, target)).await;
                (target, res)
            });
        }

        let mut translations = BTreeMap::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((target, Ok(Ok(translated)))) if !translated.trim().is_empty() => {
                    translations.insert(target, translated);
                }
                Ok((target, Ok(Ok(_)))) => {
                    warn!("pipeline: {} returned empty text for {target}", translator.name());
                }
                Ok((target, Ok(Err(e)))) => {
                    warn!("pipeline: {} failed for {src}->{target}: {e}", translator.name());
                }
                Ok((target, Err(_))) => {
                    warn!(
                        "pipeline: {} timed out after {:?} for {src}->{target}",
                        translator.name(),
                        self.timeout
                    );
                }
                Err(e) => warn!("pipeline: translator task failed: {e}"),
            }
        }

        if translations.is_empty() {
            return Resolution::new(Source::Unresolved, src, translations);
        }

        let reg = self
            .store
            .register_translation(src, text, &translations, self.initial_confidence)
            .await;
        info!(
            "pipeline: translated via {} into {} languages, entry {}",
            translator.name(),
            translations.len(),
            reg.entry_id
        );
        let mut resolution = Resolution::new(
            Source::Translator {
                entry_id: Some(reg.entry_id),
            },
            src,
            translations,
        );
        resolution.persist_error = reg.persist_error;
        resolution
    }

    async fn log_usage(
        &self,
        text: &str,
        src: Lang,
        resolution: &Resolution,
        observed_at: DateTime<Utc>,
    ) {
        let mut word = resolution.translations.clone();
        word.insert(src, text.to_string());
        let record = UsageRecord {
            timestamp: observed_at,
            word,
        };
        if let Err(e) = self.usage_log.append(&record).await {
            warn!("pipeline: failed to append usage log: {e}");
        }
    }
}
