//! Archive naming: turn a sample page into a short container name.
//!
//! The naming service is optional and best-effort. Whatever goes wrong
//! (no credentials, network error, an empty or unusable reply) ends up as an
//! empty suggestion, and [`container_name`] falls back to the document's
//! base name. Naming never blocks an export.

use crate::error::Pdf2ImgError;
use crate::prompts::{NAMING_PROMPT, NAMING_SYSTEM_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest name a suggestion is cut to.
pub const MAX_NAME_LEN: usize = 50;

/// Suffix appended to the archive's container folder.
pub const CONTAINER_SUFFIX: &str = "_exported";

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid regex"));

/// Proposes a name from one encoded page image.
///
/// Implementations return `""` on any failure; they never error.
#[async_trait]
pub trait NameSuggester: Send + Sync {
    async fn suggest(&self, sample: &[u8], mime_type: &str) -> String;
}

/// Keep `[A-Za-z0-9_]` only and cut to [`MAX_NAME_LEN`] characters.
pub fn sanitize_name(raw: &str) -> String {
    let mut name = DISALLOWED.replace_all(raw.trim(), "").into_owned();
    // only ASCII survives the filter, so byte truncation is safe
    name.truncate(MAX_NAME_LEN);
    name
}

/// `{name}_exported`, using `base_name` when the suggestion is empty.
pub fn container_name(suggested: &str, base_name: &str) -> String {
    let stem = if suggested.is_empty() {
        base_name
    } else {
        suggested
    };
    format!("{stem}{CONTAINER_SUFFIX}")
}

// ── Vision-LLM implementation ────────────────────────────────────────────

/// Asks a vision-capable LLM for a snake_case name.
pub struct LlmNameSuggester {
    provider: Arc<dyn LLMProvider>,
}

impl LlmNameSuggester {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Build a suggester from a provider name and model, or auto-detect.
    ///
    /// Resolution order:
    /// 1. `provider_name` (+ `model`, default `gpt-4.1-nano`)
    /// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
    /// 3. `OPENAI_API_KEY` present → OpenAI
    /// 4. whatever [`ProviderFactory::from_env`] finds
    pub fn from_env(provider_name: Option<&str>, model: Option<&str>) -> Result<Self, Pdf2ImgError> {
        if let Some(name) = provider_name {
            return create_provider(name, model.unwrap_or(DEFAULT_MODEL)).map(Self::new);
        }

        if let (Ok(prov), Ok(m)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !m.is_empty() {
                return create_provider(&prov, &m).map(Self::new);
            }
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                return create_provider("openai", model.unwrap_or(DEFAULT_MODEL)).map(Self::new);
            }
        }

        let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
            Pdf2ImgError::InvalidConfig(format!(
                "no LLM provider could be auto-detected for smart naming \
                 (set OPENAI_API_KEY or --provider): {e}"
            ))
        })?;
        Ok(Self::new(llm))
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2ImgError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Pdf2ImgError::InvalidConfig(format!("LLM provider '{name}' is not usable: {e}"))
    })
}

#[async_trait]
impl NameSuggester for LlmNameSuggester {
    async fn suggest(&self, sample: &[u8], mime_type: &str) -> String {
        let image = ImageData::new(STANDARD.encode(sample), mime_type).with_detail("low");
        let messages = vec![
            ChatMessage::system(NAMING_SYSTEM_PROMPT),
            ChatMessage::user_with_images(NAMING_PROMPT, vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(32),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                let name = sanitize_name(&response.content);
                debug!("Naming service suggested '{}'", name);
                name
            }
            Err(e) => {
                warn!("Naming service failed, using the document name: {}", e);
                String::new()
            }
        }
    }
}
