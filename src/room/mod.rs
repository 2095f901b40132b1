//! Room transport boundary
//!
//! A room carries audio and topic-tagged data packets between participants.
//! The agent publishes through [`Room`] and consumes inbound traffic as a
//! stream of [`RoomEvent`]s. [`LocalRoom`] is the in-process transport used by
//! the control plane and the test suite; a real media transport plugs in
//! behind the same trait.

mod local;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use local::{LocalRoom, RoomHub, RoomOutput};

use crate::Result;
use crate::voice::AudioClip;

/// Inbound injected chat text
pub const CHAT_TOPIC: &str = "chat_message";

/// Inbound gesture codes
pub const GESTURE_TOPIC: &str = "gesture";

/// Outbound host telemetry
pub const TELEMETRY_TOPIC: &str = "system_stats";

/// A data packet received on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Identity of the publishing participant, when known
    pub sender: Option<String>,
}

/// Something that happened in the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantJoined(String),
    ParticipantLeft(String),
    Data(DataPacket),
    /// Voice activity began on the participant's track
    SpeechStarted,
    /// Voice activity ended; carries the finished utterance
    UtteranceEnded(AudioClip),
}

/// Connection to one room, as seen by the agent
#[async_trait]
pub trait Room: Send + Sync {
    /// Room name
    fn name(&self) -> &str;

    /// The agent's own participant identity
    fn identity(&self) -> &str;

    /// Receive every event from this point on
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;

    /// Publish a reliable data packet on a topic
    async fn publish_data(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Publish a chunk of synthesized audio on the agent's track
    async fn publish_audio(&self, chunk: Vec<u8>) -> Result<()>;
}
