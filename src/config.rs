//! Configuration management
//!
//! Loads settings from the environment (optionally via a `.env` file),
//! matching the three credentials + bind address + debug flag described
//! in spec §6 "Environment". Structured the way the teacher lays out its
//! `Config` (a struct-of-structs with per-section `Default` impls) but
//! sourced from `std::env` rather than a TOML file, since the original
//! Python implementation (`voice_ai/config.py`) is itself a flat
//! environment-backed settings object.

use anyhow::{Context, Result};

/// Top-level configuration for the voice agent process.
#[derive(Debug, Clone)]
pub struct Config {
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: String,
    pub model: String,
    pub eot_threshold: f32,
    pub eot_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub webhook_path: String,
    pub stream_path: String,
}

fn default_stt_model() -> String {
    "flux-general-en".to_string()
}

fn default_tts_model() -> String {
    "aura-2-thalia-en".to_string()
}

fn default_llm_model() -> String {
    "gpt-5-nano".to_string()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_stt_model(),
            eot_threshold: 0.6,
            eot_timeout_ms: 3000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { api_key: String::new(), model: default_llm_model(), temperature: 1.0 }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self { api_key: String::new(), model: default_tts_model() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            webhook_path: "/incoming-call".to_string(),
            stream_path: "/ws/twilio".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, reading a `.env` file
    /// first if one is present (mirrors `SettingsConfigDict(env_file=".env")`
    /// in the original Python settings object).
    pub fn load() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !matches!(err, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound)
            {
                tracing::warn!("failed to load .env file: {err}");
            }
        }

        let stt = SttConfig {
            api_key: env_var("STT_API_KEY")?,
            model: env_or("STT_MODEL", default_stt_model()),
            eot_threshold: env_parse_or("STT_EOT_THRESHOLD", 0.6),
            eot_timeout_ms: env_parse_or("STT_EOT_TIMEOUT_MS", 3000),
        };
        let llm = LlmConfig {
            api_key: env_var("LLM_API_KEY")?,
            model: env_or("LLM_MODEL", default_llm_model()),
            temperature: env_parse_or("LLM_TEMPERATURE", 1.0),
        };
        let tts = TtsConfig {
            api_key: env_var("TTS_API_KEY")?,
            model: env_or("TTS_MODEL", default_tts_model()),
        };
        let server = ServerConfig {
            host: env_or("HOST", "0.0.0.0".to_string()),
            port: env_parse_or("PORT", 8000),
            debug: env_parse_or("DEBUG", false),
            webhook_path: env_or("WEBHOOK_PATH", "/incoming-call".to_string()),
            stream_path: env_or("STREAM_PATH", "/ws/twilio".to_string()),
        };

        Ok(Self { stt, llm, tts, server })
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_match_original_deployment() {
        assert_eq!(SttConfig::default().model, "flux-general-en");
        assert_eq!(TtsConfig::default().model, "aura-2-thalia-en");
        assert_eq!(ServerConfig::default().stream_path, "/ws/twilio");
    }

    #[test]
    fn eot_defaults_match_spec() {
        let stt = SttConfig::default();
        assert_eq!(stt.eot_threshold, 0.6);
        assert_eq!(stt.eot_timeout_ms, 3000);
    }
}
