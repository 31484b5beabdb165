//! Online learning from the usage log.
//!
//! Each observed `(lang, text)` pair reinforces the entry that contains it
//! (creating one when unseen), accumulates co-occurrence weight against
//! phrases seen at other recent timestamps, and refreshes the entry's local
//! probability share.
//!
//! `probability` is recomputed only for the entry being touched, against the
//! total confidence at that moment. Other entries keep their previous values,
//! so the map is an approximate diagnostic, not a distribution that sums to 1.

use chrono::{DateTime, Utc};
use polyglot_core::config::LearningConfig;
use polyglot_core::entry::{id_rank, Entry, StoreState, UsageRecord};
use polyglot_core::Lang;
use std::collections::{BTreeMap, VecDeque};

/// Bounded history of observations grouped by timestamp.
#[derive(Debug, Default)]
pub struct ContextWindow {
    capacity: usize,
    slots: VecDeque<(DateTime<Utc>, Vec<(Lang, String)>)>,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: VecDeque::new(),
        }
    }

    /// Record pairs seen at `ts`. Pairs for an existing timestamp merge into
    /// its slot; a new timestamp evicts the oldest slot once full.
    pub fn observe(&mut self, ts: DateTime<Utc>, pairs: impl IntoIterator<Item = (Lang, String)>) {
        let idx = match self.slots.iter().position(|(t, _)| *t == ts) {
            Some(i) => i,
            None => {
                if self.slots.len() == self.capacity {
                    self.slots.pop_front();
                }
                self.slots.push_back((ts, Vec::new()));
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[idx].1;
        for pair in pairs {
            if !slot.contains(&pair) {
                slot.push(pair);
            }
        }
    }

    /// Pairs in other-language observations from timestamps other than `ts`.
    pub fn co_occurring(&self, ts: DateTime<Utc>, lang: Lang) -> impl Iterator<Item = &(Lang, String)> {
        self.slots
            .iter()
            .filter(move |(t, _)| *t != ts)
            .flat_map(|(_, pairs)| pairs.iter())
            .filter(move |(l, _)| *l != lang)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Summary of one learning pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnReport {
    pub records: usize,
    pub observations: usize,
    pub created: Vec<String>,
    pub reinforced: usize,
}

impl LearnReport {
    pub fn changed(&self) -> bool {
        self.observations > 0
    }
}

/// Applies usage records to a store state.
#[derive(Debug, Clone, Copy)]
pub struct Learner {
    config: LearningConfig,
}

impl Learner {
    pub fn new(config: LearningConfig) -> Self {
        Self { config }
    }

    /// Learn from `records` in order, mutating `state` in place.
    pub fn learn(&self, state: &mut StoreState, records: &[UsageRecord]) -> LearnReport {
        let mut window = ContextWindow::new(self.config.context_window);
        let mut report = LearnReport {
            records: records.len(),
            ..Default::default()
        };

        for record in records {
            let ts = record.timestamp;
            let pairs: Vec<(Lang, String)> = record
                .word
                .iter()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(l, t)| (*l, t.clone()))
                .collect();
            window.observe(ts, pairs.iter().cloned());

            for (lang, text) in &pairs {
                report.observations += 1;
                let id = match locate(state, *lang, text) {
                    Some(id) => {
                        report.reinforced += 1;
                        id
                    }
                    None => {
                        let seed = BTreeMap::from([(*lang, vec![text.clone()])]);
                        let id = state.insert_new(Entry::new(seed, self.config.initial_confidence));
                        report.created.push(id.clone());
                        id
                    }
                };

                let Some(entry) = state.entries.get_mut(&id) else {
                    continue;
                };
                entry.bump_confidence(self.config.confidence_step);
                for (other_lang, other_text) in window.co_occurring(ts, *lang) {
                    *entry
                        .meaning_distance
                        .entry(Entry::distance_key(*other_lang, other_text))
                        .or_insert(0.0) += self.config.distance_step;
                }
                entry.last_modified = Some(ts);

                let confidence = entry.confidence;
                let total = state.total_confidence();
                if let Some(entry) = state.entries.get_mut(&id) {
                    let share = if total > 0.0 { confidence / total } else { 0.0 };
                    entry.probability.insert(*lang, share);
                }
            }
        }

        report
    }
}

/// Entry holding `text` verbatim under `lang`; ties go to the higher
/// confidence, then the lower id.
fn locate(state: &StoreState, lang: Lang, text: &str) -> Option<String> {
    state
        .entries
        .iter()
        .filter(|(_, e)| e.has_variant(lang, text))
        .max_by(|(a_id, a), (b_id, b)| {
            a.confidence
                .total_cmp(&b.confidence)
                .then(id_rank(b_id).cmp(&id_rank(a_id)))
        })
        .map(|(id, _)| id.clone())
}
