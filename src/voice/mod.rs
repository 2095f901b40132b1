//! Speech collaborators
//!
//! Transcription and synthesis are opaque services behind the [`Transcriber`]
//! and [`Synthesizer`] traits. The HTTP-backed implementations live in
//! `stt` and `tts`; tests substitute scripted ones.

mod stt;
mod tts;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::Result;

/// Playable audio, delivered in chunks as the synthesizer produces it
pub type AudioStream = BoxStream<'static, Result<Vec<u8>>>;

/// One complete utterance captured from the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio bytes
    pub data: Vec<u8>,
    /// MIME type of `data` (e.g. `audio/wav`)
    pub mime_type: String,
}

impl AudioClip {
    #[must_use]
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "audio/wav".to_string(),
        }
    }
}

/// Turns a finished utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Final transcript for the clip (may be empty if nothing was said)
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

/// Turns text into a playable audio stream
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}
