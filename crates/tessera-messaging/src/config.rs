use anyhow::{Context, Result};

use tessera_types::models::MAX_MESSAGE_CHARS;

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Longer message bodies are truncated, never rejected.
    pub max_message_chars: usize,
    /// Upper bound on digests sent per batch run.
    pub digest_batch_size: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_message_chars: MAX_MESSAGE_CHARS,
            digest_batch_size: 10,
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

impl MessagingConfig {
    /// Defaults overridden by `TESSERA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_message_chars: env_or("TESSERA_MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
            digest_batch_size: env_or("TESSERA_DIGEST_BATCH_SIZE", defaults.digest_batch_size)?,
            default_page_size: env_or("TESSERA_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: env_or("TESSERA_MAX_PAGE_SIZE", defaults.max_page_size)?,
        })
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
