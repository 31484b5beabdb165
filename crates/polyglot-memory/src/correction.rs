//! Human correction feedback.

use polyglot_core::entry::StoreState;

/// Result of applying one correction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionOutcome {
    pub updated: bool,
    /// Ids of entries that gained the corrected variant.
    pub touched: Vec<String>,
}

/// Append `corrected` to every variant list containing `original` verbatim.
///
/// Every matching entry is updated, not just the first. Confidence rises once
/// for each variant list that grew, so resubmitting the same correction is a
/// no-op.
pub fn apply_correction(
    state: &mut StoreState,
    original: &str,
    corrected: &str,
    confidence_step: f64,
) -> CorrectionOutcome {
    let corrected = corrected.trim();
    let mut outcome = CorrectionOutcome::default();
    if corrected.is_empty() || corrected == original {
        return outcome;
    }

    for (id, entry) in state.entries.iter_mut() {
        let mut grown = 0;
        for variants in entry.languages.values_mut() {
            if variants.iter().any(|v| v == original) && !variants.iter().any(|v| v == corrected)
            {
                variants.push(corrected.to_string());
                grown += 1;
            }
        }
        for _ in 0..grown {
            entry.bump_confidence(confidence_step);
        }
        if grown > 0 {
            outcome.touched.push(id.clone());
        }
    }

    outcome.updated = !outcome.touched.is_empty();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyglot_core::entry::Entry;
    use polyglot_core::Lang;
    use std::collections::BTreeMap;

    fn state() -> StoreState {
        let mut s = StoreState::default();
        s.entries.insert(
            "1001".into(),
            Entry::new(
                BTreeMap::from([
                    (Lang::En, vec!["Hello".to_string()]),
                    (Lang::Ja, vec!["こんにちわ".to_string()]),
                ]),
                0.3,
            ),
        );
        s.entries.insert(
            "1002".into(),
            Entry::new(
                BTreeMap::from([
                    (Lang::En, vec!["Hi".to_string()]),
                    (Lang::Ja, vec!["こんにちわ".to_string()]),
                ]),
                0.95,
            ),
        );
        s.entries.insert(
            "1003".into(),
            Entry::new(BTreeMap::from([(Lang::En, vec!["Bye".to_string()])]), 0.3),
        );
        s
    }

    #[test]
    fn test_all_matching_entries_are_updated() {
        let mut s = state();
        let out = apply_correction(&mut s, "こんにちわ", " こんにちは ", 0.1);

        assert!(out.updated);
        assert_eq!(out.touched, vec!["1001".to_string(), "1002".to_string()]);
        assert_eq!(
            s.entries["1001"].languages[&Lang::Ja],
            vec!["こんにちわ".to_string(), "こんにちは".to_string()]
        );
        assert!((s.entries["1001"].confidence - 0.4).abs() < 1e-9);
        assert_eq!(s.entries["1002"].confidence, 1.0, "capped at 1.0");
        assert_eq!(s.entries["1003"].confidence, 0.3);
    }

    #[test]
    fn test_resubmission_is_idempotent() {
        let mut s = state();
        apply_correction(&mut s, "こんにちわ", "こんにちは", 0.1);
        let before = s.clone();
        let out = apply_correction(&mut s, "こんにちわ", "こんにちは", 0.1);

        assert!(!out.updated);
        assert_eq!(s, before);
        let ja = &s.entries["1001"].languages[&Lang::Ja];
        assert_eq!(ja.iter().filter(|v| *v == "こんにちは").count(), 1);
    }

    #[test]
    fn test_no_match_leaves_state_untouched() {
        let mut s = state();
        let before = s.clone();
        let out = apply_correction(&mut s, "Good night", "Good evening", 0.1);
        assert_eq!(out, CorrectionOutcome::default());
        assert_eq!(s, before);
    }

    #[test]
    fn test_match_is_verbatim() {
        let mut s = state();
        let out = apply_correction(&mut s, "hello", "Hello there", 0.1);
        assert!(!out.updated);
    }

    #[test]
    fn test_confidence_rises_per_grown_list() {
        let mut s = StoreState::default();
        s.entries.insert(
            "1001".into(),
            Entry::new(
                BTreeMap::from([
                    (Lang::En, vec!["OK".to_string()]),
                    (Lang::Ja, vec!["OK".to_string()]),
                ]),
                0.3,
            ),
        );
        let out = apply_correction(&mut s, "OK", "Okay", 0.1);

        assert_eq!(out.touched, vec!["1001".to_string()]);
        assert!((s.entries["1001"].confidence - 0.5).abs() < 1e-9);
        assert_eq!(s.entries["1001"].languages[&Lang::Ja], vec!["OK", "Okay"]);

        let again = apply_correction(&mut s, "OK", "Okay", 0.1);
        assert!(!again.updated);
        assert!((s.entries["1001"].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_blank_correction_is_rejected() {
        let mut s = state();
        let out = apply_correction(&mut s, "Hello", "   ", 0.1);
        assert!(!out.updated);
    }
}
