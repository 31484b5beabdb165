//! Approximate lookup over the translation memory.
//!
//! Ties between candidates never depend on map iteration order: the higher
//! similarity wins, then the higher confidence, then the lower numeric id.

use polyglot_core::entry::{id_rank, Entry, StoreState};
use polyglot_core::Lang;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::similarity::{normalize, ratio};

/// A whole-message hit from memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub entry_id: String,
    pub similarity: f64,
    /// First variant of every language the entry defines, except the source.
    pub translations: BTreeMap<Lang, String>,
}

struct Candidate<'a> {
    id: &'a str,
    entry: &'a Entry,
    similarity: f64,
}

impl Candidate<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then(self.entry.confidence.total_cmp(&other.entry.confidence))
            .then(id_rank(other.id).cmp(&id_rank(self.id)))
    }
}

fn best<'a>(candidates: impl Iterator<Item = Candidate<'a>>) -> Option<Candidate<'a>> {
    candidates.max_by(|a, b| a.rank(b))
}

/// Best similarity between normalized `word` and any `lang` variant of `entry`.
fn best_similarity(entry: &Entry, lang: Lang, word: &str) -> Option<f64> {
    entry
        .languages
        .get(&lang)?
        .iter()
        .map(|v| ratio(word, &normalize(v)))
        .max_by(f64::total_cmp)
}

/// Phrase lookup: exact normalized match first, then fuzzy at `cutoff` (inclusive).
///
/// Only entries defining both `src` and `tgt` are considered. Returns the
/// winning entry's first `tgt` variant.
pub fn find_translation(
    state: &StoreState,
    word: &str,
    src: Lang,
    tgt: Lang,
    cutoff: f64,
) -> Option<String> {
    let norm = normalize(word);
    let both = || {
        state.entries.iter().filter(move |(_, e)| {
            e.languages.contains_key(&src) && e.languages.contains_key(&tgt)
        })
    };

    let exact = best(both().filter_map(|(id, entry)| {
        entry.languages[&src]
            .iter()
            .any(|v| normalize(v) == norm)
            .then_some(Candidate {
                id,
                entry,
                similarity: 1.0,
            })
    }));
    if let Some(hit) = exact {
        return hit.entry.first_variant(tgt).map(str::to_string);
    }

    let fuzzy = best(both().filter_map(|(id, entry)| {
        let similarity = best_similarity(entry, src, &norm)?;
        (similarity >= cutoff).then_some(Candidate {
            id,
            entry,
            similarity,
        })
    }));
    fuzzy.and_then(|hit| hit.entry.first_variant(tgt).map(str::to_string))
}

/// Whole-message lookup: the best entry whose `src` variant similarity
/// strictly exceeds `cutoff` and which defines at least one other language.
pub fn resolve_from_memory(
    state: &StoreState,
    text: &str,
    src: Lang,
    cutoff: f64,
) -> Option<MemoryHit> {
    let norm = normalize(text);
    let hit = best(state.entries.iter().filter_map(|(id, entry)| {
        if !entry.languages.keys().any(|l| *l != src) {
            return None;
        }
        let similarity = best_similarity(entry, src, &norm)?;
        (similarity > cutoff).then_some(Candidate {
            id,
            entry,
            similarity,
        })
    }))?;

    let translations = hit
        .entry
        .languages
        .iter()
        .filter(|(lang, _)| **lang != src)
        .filter_map(|(lang, variants)| Some((*lang, variants.first()?.clone())))
        .collect();

    Some(MemoryHit {
        entry_id: hit.id.to_string(),
        similarity: hit.similarity,
        translations,
    })
}

/// Split after sentence terminators, dropping the whitespace that follows.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '。' | '！' | '？' | '.' | '!' | '?') {
            let end = i + c.len_utf8();
            out.push(&text[start..end]);
            start = end;
            while let Some(&(j, w)) = chars.peek() {
                if !w.is_whitespace() {
                    break;
                }
                start = j + w.len_utf8();
                chars.next();
            }
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out.retain(|s| !s.trim().is_empty());
    out
}

/// Sentence-by-sentence memory translation into each of `targets`.
///
/// Sentences with no match are kept unchanged; translated pieces are joined
/// with a single space.
pub fn translate_text(
    state: &StoreState,
    text: &str,
    src: Lang,
    targets: &[Lang],
    cutoff: f64,
) -> BTreeMap<Lang, String> {
    let sentences = split_sentences(text);
    targets
        .iter()
        .filter(|t| **t != src)
        .map(|&tgt| {
            let joined = sentences
                .iter()
                .map(|s| {
                    find_translation(state, s, src, tgt, cutoff).unwrap_or_else(|| s.to_string())
                })
                .collect::<Vec<_>>()
                .join(" ");
            (tgt, joined)
        })
        .collect()
}
