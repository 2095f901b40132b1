//! Speech-to-text (STT) over HTTP

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{AudioClip, Transcriber};
use crate::{Error, Result};

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

#[derive(Clone, Copy, Debug)]
enum Backend {
    Whisper,
    Deepgram,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    backend: Backend,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, Backend::Whisper, "OpenAI API key required for Whisper")
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, Backend::Deepgram, "Deepgram API key required for STT")
    }

    fn new(api_key: SecretString, model: String, backend: Backend, missing: &str) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(missing.to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend,
        })
    }

    async fn transcribe_whisper(&self, clip: &AudioClip) -> Result<String> {
        tracing::debug!(audio_bytes = clip.data.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(clip.data.clone())
                    .file_name("utterance.wav")
                    .mime_str(&clip.mime_type)
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Stt(format!("Whisper request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("invalid Whisper response: {e}")))?;

        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, clip: &AudioClip) -> Result<String> {
        tracing::debug!(audio_bytes = clip.data.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", &clip.mime_type)
            .body(clip.data.clone())
            .send()
            .await
            .map_err(|e| Error::Stt(format!("Deepgram request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("invalid Deepgram response: {e}")))?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let transcript = match self.backend {
            Backend::Whisper => self.transcribe_whisper(clip).await?,
            Backend::Deepgram => self.transcribe_deepgram(clip).await?,
        };
        let transcript = transcript.trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_a_config_error() {
        let err = SpeechToText::new_deepgram(SecretString::from(String::new()), "nova-2".into())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_output_hides_key() {
        let stt = SpeechToText::new_whisper(SecretString::from("sk-secret".to_string()), "whisper-1".into())
            .unwrap();
        assert!(!format!("{stt:?}").contains("sk-secret"));
    }
}
