//! TOML configuration file loading
//!
//! Supports `~/.config/ada/config.toml` (or the path in `ADA_CONFIG`) as a
//! persistent config source. All fields are optional: the file is a partial
//! overlay on top of defaults, and environment variables override it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdaConfigFile {
    #[serde(default)]
    pub room: RoomFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    #[serde(default)]
    pub livekit: LiveKitFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub session: SessionFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomFileConfig {
    /// Room the agent joins
    pub name: Option<String>,
    /// Participant identity the agent uses
    pub identity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o")
    pub model: Option<String>,
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "deepgram" or "openai"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,
    /// "deepgram", "elevenlabs" or "openai"
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveKitFileConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Control plane port
    pub port: Option<u16>,
    /// Front-end directory served at `/command-center`
    pub static_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub greeting: Option<String>,
    pub system_prompt: Option<String>,
    pub telemetry_interval_secs: Option<u64>,
    pub max_tool_rounds: Option<u32>,
    pub max_provider_retries: Option<u32>,
    /// Where todo and calendar files live
    pub data_dir: Option<String>,
}

/// Load the TOML config file from `ADA_CONFIG` or the standard path
///
/// Returns `AdaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AdaConfigFile {
    let path = std::env::var("ADA_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    path.map_or_else(AdaConfigFile::default, |p| load_from(&p))
}

/// Load a specific config file, falling back to defaults
pub fn load_from(path: &Path) -> AdaConfigFile {
    if !path.exists() {
        return AdaConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AdaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            AdaConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ada/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ada").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file: AdaConfigFile = toml::from_str(
            r#"
            [room]
            name = "lab"

            [voice]
            tts_provider = "elevenlabs"

            [session]
            telemetry_interval_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(file.room.name.as_deref(), Some("lab"));
        assert_eq!(file.voice.tts_provider.as_deref(), Some("elevenlabs"));
        assert_eq!(file.session.telemetry_interval_secs, Some(5));
        assert!(file.llm.model.is_none());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "room = [not valid").unwrap();
        assert!(load_from(&path).room.name.is_none());
        assert!(load_from(&dir.path().join("missing.toml")).room.name.is_none());
    }
}
