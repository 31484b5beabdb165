//! The authoritative translation memory.
//!
//! One `Store` is built at startup and cloned (cheaply) into every component.
//! Readers work on an immutable snapshot and never wait for disk I/O.
//! Mutations are serialized through a single writer: copy the current state,
//! apply, save atomically, then publish the new snapshot.


use polyglot_core::config::{Config, CorrectionConfig, MatcherConfig};
use polyglot_core::entry::{Entry, StoreState, UsageRecord};
use polyglot_core::error::PolyglotError;
use polyglot_core::{persist, Lang};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::correction::{apply_correction, CorrectionOutcome};
use crate::learning::{LearnReport, Learner};
use crate::matcher::{self, MemoryHit};

/// A freshly registered entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub entry_id: String,
    /// Set when the entry is live in memory but could not be saved.
    pub persist_error: Option<String>,
}

/// Shared handle to the translation memory.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    matcher: MatcherConfig,
    correction: CorrectionConfig,
    current: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
}

impl Store {
    /// Open the store at `path`. A missing file starts an empty memory.
    pub async fn open(
        path: impl Into<PathBuf>,
        matcher: MatcherConfig,
        correction: CorrectionConfig,
    ) -> Result<Self, PolyglotError> {
        let path = path.into();
        let state = load(&path).await?;
        info!(
            "store: loaded {} entries from {}",
            state.entries.len(),
            path.display()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                matcher,
                correction,
                current: RwLock::new(Arc::new(state)),
                writer: Mutex::new(()),
            }),
        })
    }

    /// Open the store configured in `cfg`.
    pub async fn from_config(cfg: &Config) -> Result<Self, PolyglotError> {
        Self::open(cfg.store_path(), cfg.matcher, cfg.correction).await
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        self.inner.matcher
    }

    /// Current published state.
    pub async fn snapshot(&self) -> Arc<StoreState> {
        self.inner.current.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // --- Read path ---

    /// Phrase lookup at the configured fuzzy cutoff.
    pub async fn find_translation(&self, word: &str, src: Lang, tgt: Lang) -> Option<String> {
        let state = self.snapshot().await;
        matcher::find_translation(&state, word, src, tgt, self.inner.matcher.fuzzy_cutoff)
    }

    /// Whole-message lookup at the configured resolve cutoff.
    pub async fn resolve_from_memory(&self, text: &str, src: Lang) -> Option<MemoryHit> {
        let state = self.snapshot().await;
        matcher::resolve_from_memory(&state, text, src, self.inner.matcher.resolve_cutoff)
    }

    /// Sentence-segmented memory translation.
    pub async fn translate_text(
        &self,
        text: &str,
        src: Lang,
        targets: &[Lang],
    ) -> BTreeMap<Lang, String> {
        let state = self.snapshot().await;
        matcher::translate_text(&state, text, src, targets, self.inner.matcher.fuzzy_cutoff)
    }

    // --- Write path ---

    /// Register a translation discovered through the external translator.
    ///
    /// The entry is published even if saving fails; the failure is reported
    /// in the returned `Registration`.
    pub async fn register_translation(
        &self,
        src: Lang,
        text: &str,
        translations: &BTreeMap<Lang, String>,
        confidence: f64,
    ) -> Registration {
        let _guard = self.inner.writer.lock().await;
        let mut next = (*self.snapshot().await).clone();

        let mut languages = BTreeMap::from([(src, vec![text.to_string()])]);
        for (lang, translated) in translations {
            if *lang != src && !translated.is_empty() {
                languages.insert(*lang, vec![translated.clone()]);
            }
        }
        let entry_id = next.insert_new(Entry::new(languages, confidence));
        let result = save(&self.inner.path, &next).await;
        *self.inner.current.write().await = Arc::new(next);

        let persist_error = match result {
            Ok(()) => {
                info!("store: registered entry {entry_id} ({src}: {text})");
                None
            }
            Err(e) => {
                error!("store: entry {entry_id} registered but not saved: {e}");
                Some(e.to_string())
            }
        };
        Registration {
            entry_id,
            persist_error,
        }
    }

    /// Add an entry directly. Every language must carry at least one variant.
    pub async fn add_entry(
        &self,
        languages: BTreeMap<Lang, Vec<String>>,
        confidence: f64,
    ) -> Result<String, PolyglotError> {
        let entry = Entry::new(languages, confidence);
        if !entry.is_well_formed() {
            return Err(PolyglotError::Memory(
                "entry needs at least one language with at least one variant".into(),
            ));
        }
        self.write(move |state| (state.insert_new(entry), true))
            .await
    }

    /// Overwrite an entry's confidence (clamped to [0, 1]). Returns `false`
    /// when no entry has this id.
    pub async fn set_confidence(&self, id: &str, confidence: f64) -> Result<bool, PolyglotError> {
        let value = confidence.clamp(0.0, 1.0);
        self.write(|state| match state.entries.get_mut(id) {
            Some(entry) => {
                entry.confidence = value;
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    /// Run one learning pass over `records`.
    ///
    /// On a save failure nothing is published; the caller keeps the records
    /// for a retry.
    pub async fn learn(
        &self,
        learner: &Learner,
        records: &[UsageRecord],
    ) -> Result<LearnReport, PolyglotError> {
        self.write(|state| {
            let report = learner.learn(state, records);
            let changed = report.changed();
            (report, changed)
        })
        .await
    }

    /// Apply a human correction to every entry containing `original`.
    pub async fn submit_correction(
        &self,
        original: &str,
        corrected: &str,
    ) -> Result<CorrectionOutcome, PolyglotError> {
        let step = self.inner.correction.confidence_step;
        let outcome = self
            .write(|state| {
                let outcome = apply_correction(state, original, corrected, step);
                let changed = outcome.updated;
                (outcome, changed)
            })
            .await?;
        if outcome.updated {
            info!(
                "correction: added variant to entries {}",
                outcome.touched.join(", ")
            );
        } else {
            info!("correction: no matching entry for {original:?}");
        }
        Ok(outcome)
    }

    /// Serialized copy-apply-save-publish. `f` returns its result and whether
    /// it changed anything; unchanged states are neither saved nor published.
    async fn write<R>(
        &self,
        f: impl FnOnce(&mut StoreState) -> (R, bool),
    ) -> Result<R, PolyglotError> {
        let _guard = self.inner.writer.lock().await;
        let mut next = (*self.snapshot().await).clone();
        let (out, changed) = f(&mut next);
        if changed {
            if let Err(e) = save(&self.inner.path, &next).await {
                error!("store: save to {} failed: {e}", self.inner.path.display());
                return Err(e);
            }
            *self.inner.current.write().await = Arc::new(next);
        }
        Ok(out)
    }
}

/// Read the store file. A missing file is an empty store.
pub async fn load(path: &Path) -> Result<StoreState, PolyglotError> {
    let path = path.to_path_buf();
    join_blocking(tokio::task::spawn_blocking(move || persist::load_json(&path)))
        .await
        .map_err(|e| PolyglotError::Memory(format!("failed to load store: {e}")))
}

/// Atomically save `state` to `path`.
///
/// The write runs on the blocking pool and completes even if the calling
/// future is dropped, so cancellation never leaves a half-written file.
pub async fn save(path: &Path, state: &StoreState) -> Result<(), PolyglotError> {
    let bytes = persist::to_json_bytes(state)?;
    let path = path.to_path_buf();
    join_blocking(tokio::task::spawn_blocking(move || {
        persist::write_atomic(&path, &bytes)
    }))
    .await
}

async fn join_blocking<T>(
    handle: tokio::task::JoinHandle<Result<T, PolyglotError>>,
) -> Result<T, PolyglotError> {
    handle
        .await
        .map_err(|e| PolyglotError::Memory(format!("store task failed: {e}")))?
}
