//! Translation memory data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::lang::Lang;

/// Ids are allocated above this floor.
pub const ID_FLOOR: u64 = 1000;

/// Confidence assigned to entries the system learns on its own.
pub const DEFAULT_CONFIDENCE: f64 = 0.3;

/// Context tag for entries registered without classification.
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// One equivalence set of accepted phrasings across languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Accepted variants per language. Index 0 is the preferred phrasing.
    pub languages: BTreeMap<Lang, Vec<String>>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// `"<lang>:<phrase>"` → accumulated co-occurrence weight.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meaning_distance: BTreeMap<String, f64>,
    /// Locally recomputed share of total confidence. Stale between updates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub probability: BTreeMap<Lang, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default = "default_context")]
    pub context: String,
}

impl Entry {
    /// A fresh entry with the given variants and confidence.
    pub fn new(languages: BTreeMap<Lang, Vec<String>>, confidence: f64) -> Self {
        Self {
            languages,
            confidence: confidence.clamp(0.0, 1.0),
            meaning_distance: BTreeMap::new(),
            probability: BTreeMap::new(),
            last_modified: None,
            context: default_context(),
        }
    }

    /// Preferred (first) variant for `lang`.
    pub fn first_variant(&self, lang: Lang) -> Option<&str> {
        self.languages
            .get(&lang)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Whether `text` is a verbatim variant of `lang`.
    pub fn has_variant(&self, lang: Lang, text: &str) -> bool {
        self.languages
            .get(&lang)
            .is_some_and(|v| v.iter().any(|t| t == text))
    }

    /// Raise confidence by `step`, saturating at 1.0.
    pub fn bump_confidence(&mut self, step: f64) {
        self.confidence = (self.confidence + step).clamp(0.0, 1.0);
    }

    /// Key used in `meaning_distance` for a phrase in another language.
    pub fn distance_key(lang: Lang, text: &str) -> String {
        format!("{lang}:{text}")
    }

    /// Every language has at least one variant and at least one language exists.
    pub fn is_well_formed(&self) -> bool {
        !self.languages.is_empty() && self.languages.values().all(|v| !v.is_empty())
    }
}

/// Persisted state of the translation memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
}

impl StoreState {
    /// Next id: highest numeric id + 1, never below `ID_FLOOR + 1`.
    ///
    /// If the highest id is `u64::MAX`, the lowest free id above the floor is
    /// used instead.
    pub fn next_id(&self) -> String {
        let max = self
            .entries
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .unwrap_or(ID_FLOOR)
            .max(ID_FLOOR);
        match max.checked_add(1) {
            Some(next) => next.to_string(),
            None => (ID_FLOOR + 1..=u64::MAX)
                .map(|n| n.to_string())
                .find(|id| !self.entries.contains_key(id))
                .unwrap_or_default(),
        }
    }

    /// Insert `entry` under a fresh id and return the id.
    pub fn insert_new(&mut self, entry: Entry) -> String {
        let id = self.next_id();
        self.entries.insert(id.clone(), entry);
        id
    }

    /// Sum of confidence across all entries.
    pub fn total_confidence(&self) -> f64 {
        self.entries.values().map(|e| e.confidence).sum()
    }
}

/// Numeric value of an entry id, used for tie-breaks. Non-numeric ids sort last.
pub fn id_rank(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

/// Binds one external message channel to a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub lang: Lang,
    /// Opaque delivery handle (e.g. a webhook URL).
    #[serde(alias = "webhook")]
    pub sink: String,
}

/// One observation written by the resolution pipeline for learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub word: BTreeMap<Lang, String>,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_context() -> String {
    UNKNOWN_CONTEXT.to_string()
}
