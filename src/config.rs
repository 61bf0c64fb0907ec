use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BATCH_LIMIT: usize = 10;
pub const DEFAULT_BATCH_PACING: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(65);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Placeholder shipped in the original tool's config; treated as "not
/// configured" so a copy-pasted setup fails fast instead of burning a batch.
const PLACEHOLDER_API_KEY: &str = "TU_API_KEY_AQUI";

/// Explicit run configuration handed to the engine constructor; nothing in
/// the pipeline reads ambient state.
#[derive(Debug, Clone)]
pub struct OrganizeConfig {
    pub root: PathBuf,
    pub apply: bool,
    pub api_key: String,
    pub model: String,
    /// Output-language directive for resolved titles; `original` keeps the
    /// title's own language.
    pub title_language: String,
    pub batch_limit: usize,
    pub batch_pacing: Duration,
    pub backoff_base: Duration,
    pub max_attempts: u32,
}

impl OrganizeConfig {
    /// Fails before any scanning when the credential is absent or still the
    /// placeholder.
    pub fn from_env(root: PathBuf, apply: bool) -> Result<Self> {
        let api_key = match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY => key,
            _ => bail!(
                "GEMINI_API_KEY is not configured; export it before running"
            ),
        };
        let model =
            std::env::var("CINESHELF_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let title_language = std::env::var("CINESHELF_TITLE_LANGUAGE")
            .unwrap_or_else(|_| "original".to_string());

        Ok(Self {
            root,
            apply,
            api_key,
            model,
            title_language,
            batch_limit: DEFAULT_BATCH_LIMIT,
            batch_pacing: DEFAULT_BATCH_PACING,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    #[cfg(test)]
    pub fn for_tests(root: PathBuf, apply: bool) -> Self {
        Self {
            root,
            apply,
            api_key: "test-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            title_language: "original".to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            batch_pacing: Duration::ZERO,
            backoff_base: Duration::ZERO,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
