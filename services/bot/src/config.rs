use runa_core::speech::voice_from_name;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_api_base: String,
    pub openai_api_key: String,
    pub openai_organization_id: Option<String>,
    pub assistant_id: String,
    pub transcription_language: String,
    pub tts_voice: String,
    pub ffmpeg_path: PathBuf,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let telegram_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_api_base = std::env::var("TELEGRAM_API_BASE")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();

        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_organization_id = std::env::var("OPENAI_ORGANIZATION_ID")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let assistant_id = required("OPENAI_ASSISTANT_ID")?;

        let transcription_language =
            std::env::var("TRANSCRIPTION_LANGUAGE").unwrap_or_else(|_| "lv".to_string());

        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        if voice_from_name(&tts_voice).is_none() {
            return Err(ConfigError::InvalidValue(
                "TTS_VOICE".to_string(),
                format!("'{}' is not a supported voice", tts_voice),
            ));
        }

        let ffmpeg_path = std::env::var("FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));

        let poll_interval = Duration::from_millis(parsed("POLL_INTERVAL_MS", 1000u64)?);
        let poll_max_attempts = parsed("POLL_MAX_ATTEMPTS", 300u32)?;
        if poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "POLL_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            telegram_token,
            telegram_api_base,
            openai_api_key,
            openai_organization_id,
            assistant_id,
            transcription_language,
            tts_voice,
            ffmpeg_path,
            poll_interval,
            poll_max_attempts,
            log_level,
        })
    }
}
