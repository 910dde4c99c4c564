use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Only the upstream API key is required; everything else has a default.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,
    /// Answer length (chars) above which the heuristic scores "excellent".
    pub eval_excellent_threshold: usize,
    /// Answer length (chars) above which the heuristic scores "average".
    pub eval_average_threshold: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_api_url: env_or(
                "OPENAI_API_URL",
                "https://api.openai.com/v1/chat/completions",
            ),
            openai_model: env_or("OPENAI_MODEL", "gpt-4"),
            openai_max_tokens: parse_env("OPENAI_MAX_TOKENS", 1000)?,
            openai_temperature: parse_env("OPENAI_TEMPERATURE", 0.7)?,
            // Placeholder rubric thresholds; tune via env rather than code.
            eval_excellent_threshold: parse_env("EVAL_EXCELLENT_THRESHOLD", 40)?,
            eval_average_threshold: parse_env("EVAL_AVERAGE_THRESHOLD", 15)?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value")),
        Err(_) => Ok(default),
    }
}
