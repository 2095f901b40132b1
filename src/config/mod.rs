//! Configuration management for the Ada agent
//!
//! Provider selection is explicit configuration resolved once at startup
//! (env > toml > default) and handed to each session. A selected provider
//! without its key is a startup error, never a mid-session one.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::agent::{DEFAULT_SYSTEM_PROMPT, OpenAiReasoner, Reasoner};
use crate::orchestrator::OrchestratorConfig;
use crate::voice::{SpeechToText, Synthesizer, TextToSpeech, Transcriber};
use crate::{Error, Result};
use file::AdaConfigFile;

/// Spoken when a participant joins
pub const DEFAULT_GREETING: &str = "Hello Sir. ADA is connected via LiveKit. How can I help you today?";

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Deepgram,
    OpenAi,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepgram" => Ok(Self::Deepgram),
            "openai" | "whisper" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

impl SttProvider {
    const fn default_model(self) -> &'static str {
        match self {
            Self::Deepgram => "nova-2",
            Self::OpenAi => "whisper-1",
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    Deepgram,
    ElevenLabs,
    OpenAi,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepgram" => Ok(Self::Deepgram),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

impl TtsProvider {
    const fn default_model(self) -> &'static str {
        match self {
            Self::Deepgram => "aura-asteria-en",
            Self::ElevenLabs => "eleven_turbo_v2",
            Self::OpenAi => "tts-1",
        }
    }

    const fn default_voice(self) -> &'static str {
        match self {
            Self::Deepgram => "",
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
            Self::OpenAi => "alloy",
        }
    }
}

/// Ada agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Room the agent joins and the identity it uses there
    pub room: RoomConfig,

    /// HTTP control plane
    pub api_server: ApiServerConfig,

    /// Access token signing
    pub livekit: LiveKitConfig,

    /// Speech collaborators
    pub voice: VoiceConfig,

    /// Reasoning collaborator
    pub llm: LlmConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,

    /// Per-session policy
    pub session: SessionConfig,

    /// Directory for todo and calendar files
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub name: String,
    pub identity: String,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub port: u16,
    /// Front-end directory served at `/command-center`
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LiveKitConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt_provider: SttProvider,
    pub stt_model: String,
    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub tts_voice: String,
    /// `OpenAI` only (0.25 to 4.0)
    pub tts_speed: f32,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (reasoning, Whisper, TTS)
    pub openai: Option<SecretString>,
    /// `Deepgram` API key (STT, TTS)
    pub deepgram: Option<SecretString>,
    /// `ElevenLabs` API key (TTS)
    pub elevenlabs: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub greeting: String,
    pub system_prompt: String,
    pub telemetry_interval: Duration,
    pub max_tool_rounds: u32,
    pub max_provider_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            telemetry_interval: Duration::from_secs(2),
            max_tool_rounds: 4,
            max_provider_retries: 1,
        }
    }
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Layer `env` over `fc` over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn resolve(fc: AdaConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = |key: &str, file: Option<String>| {
            env(key)
                .or(file)
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        };

        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", fc.api_keys.openai),
            deepgram: secret("DEEPGRAM_API_KEY", fc.api_keys.deepgram),
            elevenlabs: secret("ELEVENLABS_API_KEY", fc.api_keys.elevenlabs),
        };

        let livekit = LiveKitConfig {
            url: env("LIVEKIT_URL").or(fc.livekit.url),
            api_key: env("LIVEKIT_API_KEY").or(fc.livekit.api_key),
            api_secret: secret("LIVEKIT_API_SECRET", fc.livekit.api_secret),
        };

        let room = RoomConfig {
            name: env("ADA_ROOM")
                .or(fc.room.name)
                .unwrap_or_else(|| "ada".to_string()),
            identity: env("ADA_IDENTITY")
                .or(fc.room.identity)
                .unwrap_or_else(|| "ada-agent".to_string()),
        };

        let api_server = ApiServerConfig {
            port: match env("ADA_PORT") {
                Some(port) => port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid ADA_PORT: {port}")))?,
                None => fc.server.port.unwrap_or(8000),
            },
            static_dir: env("ADA_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let stt_provider: SttProvider = env("ADA_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map_or(Ok(SttProvider::Deepgram), |s| s.parse())?;
        let tts_provider: TtsProvider = env("ADA_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map_or(Ok(TtsProvider::Deepgram), |s| s.parse())?;

        let voice = VoiceConfig {
            stt_provider,
            stt_model: env("ADA_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            tts_provider,
            tts_model: env("ADA_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            tts_voice: env("ADA_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
        };

        let llm = LlmConfig {
            model: env("ADA_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: env("ADA_LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            greeting: env("ADA_GREETING")
                .or(fc.session.greeting)
                .unwrap_or(defaults.greeting),
            system_prompt: fc.session.system_prompt.unwrap_or(defaults.system_prompt),
            telemetry_interval: fc
                .session
                .telemetry_interval_secs
                .filter(|s| *s > 0)
                .map_or(defaults.telemetry_interval, Duration::from_secs),
            max_tool_rounds: fc.session.max_tool_rounds.unwrap_or(defaults.max_tool_rounds),
            max_provider_retries: fc
                .session
                .max_provider_retries
                .unwrap_or(defaults.max_provider_retries),
        };

        // Determine data directory (~/.local/share/ada on Linux)
        let data_dir = env("ADA_DATA_DIR")
            .or(fc.session.data_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("ada"))
            });

        Ok(Self {
            room,
            api_server,
            livekit,
            voice,
            llm,
            api_keys,
            session,
            data_dir,
        })
    }

    /// Check that every selected provider can be constructed
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing credential
    pub fn validate(&self) -> Result<()> {
        self.reasoner()?;
        self.transcriber()?;
        self.synthesizer()?;
        Ok(())
    }

    fn key(key: Option<&SecretString>, name: &str) -> Result<SecretString> {
        key.cloned()
            .ok_or_else(|| Error::Config(format!("{name} is not set")))
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the `OpenAI` key is missing
    pub fn reasoner(&self) -> Result<Arc<dyn Reasoner>> {
        let key = Self::key(self.api_keys.openai.as_ref(), "OPENAI_API_KEY")?;
        Ok(Arc::new(OpenAiReasoner::new(key, &self.llm.base_url, self.llm.model.clone())?))
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the selected provider's key is missing
    pub fn transcriber(&self) -> Result<Arc<dyn Transcriber>> {
        let model = self.voice.stt_model.clone();
        let stt = match self.voice.stt_provider {
            SttProvider::Deepgram => SpeechToText::new_deepgram(
                Self::key(self.api_keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")?,
                model,
            )?,
            SttProvider::OpenAi => SpeechToText::new_whisper(
                Self::key(self.api_keys.openai.as_ref(), "OPENAI_API_KEY")?,
                model,
            )?,
        };
        Ok(Arc::new(stt))
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the selected provider's key is missing
    pub fn synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        let voice = &self.voice;
        let tts = match voice.tts_provider {
            TtsProvider::Deepgram => TextToSpeech::new_deepgram(
                Self::key(self.api_keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")?,
                voice.tts_model.clone(),
            )?,
            TtsProvider::ElevenLabs => TextToSpeech::new_elevenlabs(
                Self::key(self.api_keys.elevenlabs.as_ref(), "ELEVENLABS_API_KEY")?,
                voice.tts_voice.clone(),
                voice.tts_model.clone(),
            )?,
            TtsProvider::OpenAi => TextToSpeech::new_openai(
                Self::key(self.api_keys.openai.as_ref(), "OPENAI_API_KEY")?,
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            )?,
        };
        Ok(Arc::new(tts))
    }

    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self.session.system_prompt.clone(),
            max_tool_rounds: self.session.max_tool_rounds,
            max_provider_retries: self.session.max_provider_retries,
        }
    }
}
