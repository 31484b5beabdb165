//! The fixed set of languages the translation memory covers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolyglotError;

/// A supported language code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ja,
    En,
    Ko,
    Zh,
}

impl Lang {
    /// Every supported language, in canonical order.
    pub const ALL: [Lang; 4] = [Lang::Ja, Lang::En, Lang::Ko, Lang::Zh];

    /// ISO 639-1 code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
            Self::Ko => "ko",
            Self::Zh => "zh",
        }
    }

    /// All supported languages except `self`.
    pub fn others(self) -> impl Iterator<Item = Lang> {
        Self::ALL.into_iter().filter(move |l| *l != self)
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = PolyglotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(Self::Ja),
            "en" => Ok(Self::En),
            "ko" => Ok(Self::Ko),
            "zh" => Ok(Self::Zh),
            other => Err(PolyglotError::Config(format!(
                "unsupported language '{other}' (expected one of: ja, en, ko, zh)"
            ))),
        }
    }
}
