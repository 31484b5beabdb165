//! Google Translate API v2 backend.
//!
//! The key comes from `[translator].api_key` or the
//! `GOOGLE_TRANSLATE_API_KEY` environment variable.

use async_trait::async_trait;
use polyglot_core::{config::TranslatorConfig, error::PolyglotError, traits::Translator, Lang};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Google Translate v2 over HTTPS.
pub struct GoogleTranslator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleTranslator {
    /// Create from config values. Fails when no API key is available.
    pub fn from_config(cfg: &TranslatorConfig) -> Result<Self, PolyglotError> {
        let api_key = cfg.resolved_api_key().ok_or_else(|| {
            PolyglotError::Config(
                "translator.api_key is empty and GOOGLE_TRANSLATE_API_KEY is not set".into(),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| PolyglotError::Translator(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: cfg.base_url.clone(),
        })
    }
}

impl std::fmt::Debug for GoogleTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTranslator")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// --- Serde types ---

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: Option<TranslateData>,
}

#[derive(Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// Google's language code for `lang`.
fn google_code(lang: Lang) -> &'static str {
    match lang {
        Lang::Zh => "zh-CN",
        other => other.as_str(),
    }
}

/// Pull the first translation out of a v2 response body.
fn parse_response(body: &str) -> Result<String, PolyglotError> {
    let parsed: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| PolyglotError::Translator(format!("google: failed to parse response: {e}")))?;
    parsed
        .data
        .and_then(|d| d.translations.into_iter().next())
        .map(|t| t.translated_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PolyglotError::Translator("google: response has no translations".into()))
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        source: Lang,
        target: Lang,
    ) -> Result<String, PolyglotError> {
        let body = TranslateRequest {
            q: text,
            source: google_code(source),
            target: google_code(target),
            format: "text",
        };

        debug!("google: POST {} {source}->{target}", self.base_url);

        let resp = self
            .client
            .post(&self.base_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| PolyglotError::Translator(format!("google request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PolyglotError::Translator(format!("google: failed to read body: {e}")))?;
        if !status.is_success() {
            return Err(PolyglotError::Translator(format!(
                "google returned {status}: {text}"
            )));
        }
        parse_response(&text)
    }
}
