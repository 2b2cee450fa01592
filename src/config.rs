use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub gpt_model: String,
    pub image_model: String,
    pub image_size: String,
    pub portrait_aspect_ratio: String,
    pub landscape_aspect_ratio: String,
    pub always_include_in_prompt: String,
    pub catalog_path: Option<PathBuf>,
    pub style_queue_path: PathBuf,
    pub staging_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub news_language: String,
    pub news_country: String,
    pub google_calendar_id: String,
    pub google_token_path: PathBuf,
    pub calendar_ignored_recurring_ids: Vec<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,
    pub aws_s3_bucket: String,
    pub aws_s3_endpoint: String,
    pub site_prefix: String,
    pub http_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    let value = env_string(name, default);
    if value.trim().is_empty() {
        PathBuf::from(default)
    } else {
        PathBuf::from(value.trim())
    }
}

fn env_optional_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn env_csv(name: &str, default: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn normalize_aspect_ratio(name: &str, value: String, default: &str) -> String {
    let trimmed = value.trim();
    let valid = trimmed
        .split_once(':')
        .map(|(width, height)| {
            width.trim().parse::<u32>().map(|w| w > 0).unwrap_or(false)
                && height.trim().parse::<u32>().map(|h| h > 0).unwrap_or(false)
        })
        .unwrap_or(false);
    if valid {
        return trimmed.to_string();
    }
    warn!(
        "Invalid {} value '{}'; defaulting to {}.",
        name, value, default
    );
    default.to_string()
}

fn normalize_site_prefix(value: String) -> String {
    value.trim().trim_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let http_timeout_seconds = env_u64("HTTP_TIMEOUT_SECONDS", 150);
        if http_timeout_seconds == 0 {
            return Err(anyhow!("HTTP_TIMEOUT_SECONDS must be greater than zero"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info"),
            logs_dir: env_path("LOGS_DIR", "logs"),
            openrouter_api_key: env_string("OPENROUTER_API_KEY", ""),
            openrouter_base_url: env_string("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
            gpt_model: env_string("GPT_MODEL", "openai/gpt-4.1"),
            image_model: env_string("IMAGE_MODEL", "google/gemini-3-pro-image-preview"),
            image_size: env_string("IMAGE_SIZE", "2K"),
            portrait_aspect_ratio: normalize_aspect_ratio(
                "PORTRAIT_ASPECT_RATIO",
                env_string("PORTRAIT_ASPECT_RATIO", "9:16"),
                "9:16",
            ),
            landscape_aspect_ratio: normalize_aspect_ratio(
                "LANDSCAPE_ASPECT_RATIO",
                env_string("LANDSCAPE_ASPECT_RATIO", "16:9"),
                "16:9",
            ),
            always_include_in_prompt: env_string("ALWAYS_INCLUDE_IN_PROMPT", ""),
            catalog_path: env_optional_path("CATALOG_PATH"),
            style_queue_path: env_path("STYLE_QUEUE_PATH", "randomish_queue.json"),
            staging_dir: env_path("STAGING_DIR", "staging"),
            static_dir: env_optional_path("STATIC_DIR"),
            news_language: env_string("NEWS_LANGUAGE", "en"),
            news_country: env_string("NEWS_COUNTRY", "US"),
            google_calendar_id: env_string("GOOGLE_CALENDAR_ID", "primary"),
            google_token_path: env_path("GOOGLE_TOKEN_PATH", "token.json"),
            calendar_ignored_recurring_ids: env_csv("CALENDAR_IGNORED_RECURRING_IDS", ""),
            aws_access_key_id: env_string("AWS_ACCESS_KEY_ID", ""),
            aws_secret_access_key: env_string("AWS_SECRET_ACCESS_KEY", ""),
            aws_region: env_string("AWS_REGION", "us-east-1"),
            aws_s3_bucket: env_string("AWS_S3_BUCKET", ""),
            aws_s3_endpoint: env_string("AWS_S3_ENDPOINT", ""),
            site_prefix: normalize_site_prefix(env_string("SITE_PREFIX", "")),
            http_timeout_seconds,
        })
    }

    pub fn openrouter_api_key(&self) -> Result<&str> {
        let key = self.openrouter_api_key.trim();
        if key.is_empty() {
            return Err(anyhow!("OPENROUTER_API_KEY is required to generate art"));
        }
        Ok(key)
    }

    pub fn s3_configured(&self) -> bool {
        !self.aws_access_key_id.trim().is_empty()
            && !self.aws_secret_access_key.trim().is_empty()
            && !self.aws_s3_bucket.trim().is_empty()
    }
}
