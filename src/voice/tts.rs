//! Text-to-speech (TTS) over HTTP
//!
//! Every backend answers with an audio body that is forwarded chunk by chunk
//! as it arrives, so playback can start before synthesis finishes.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use super::{AudioStream, Synthesizer};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug)]
enum Backend {
    OpenAI,
    ElevenLabs,
    Deepgram,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    backend: Backend,
}

impl std::fmt::Debug for TextToSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSpeech")
            .field("backend", &self.backend)
            .field("voice", &self.voice)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: SecretString, voice: String, speed: f32, model: String) -> Result<Self> {
        Self::new(api_key, voice, speed, model, Backend::OpenAI)
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String, model: String) -> Result<Self> {
        Self::new(api_key, voice_id, 1.0, model, Backend::ElevenLabs)
    }

    /// Create a new TTS instance using Deepgram Aura
    ///
    /// The voice is part of the model name (e.g. `aura-asteria-en`).
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, String::new(), 1.0, model, Backend::Deepgram)
    }

    fn new(api_key: SecretString, voice: String, speed: f32, model: String, backend: Backend) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!("{backend:?} API key required for TTS")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            backend,
        })
    }

    fn request(&self, text: &str) -> reqwest::RequestBuilder {
        match self.backend {
            Backend::OpenAI => self
                .client
                .post("https://api.openai.com/v1/audio/speech")
                .bearer_auth(self.api_key.expose_secret())
                .json(&serde_json::json!({
                    "model": self.model,
                    "input": text,
                    "voice": self.voice,
                    "speed": self.speed,
                })),
            Backend::ElevenLabs => self
                .client
                .post(format!(
                    "https://api.elevenlabs.io/v1/text-to-speech/{}/stream",
                    self.voice
                ))
                .header("xi-api-key", self.api_key.expose_secret())
                .json(&serde_json::json!({
                    "text": text,
                    "model_id": self.model,
                })),
            Backend::Deepgram => self
                .client
                .post(format!("https://api.deepgram.com/v1/speak?model={}", self.model))
                .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
                .json(&serde_json::json!({ "text": text })),
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        tracing::debug!(backend = ?self.backend, chars = text.len(), "starting synthesis");

        let response = self
            .request(text)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("{:?} request failed: {e}", self.backend)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!("{:?} TTS error {status}: {body}", self.backend)));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| Error::Tts(e.to_string())));
        Ok(stream.boxed())
    }
}
