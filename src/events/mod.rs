//! External event channel
//!
//! Listens to inbound data packets and turns the ones it understands into
//! turn triggers. Chat injections become user messages; gesture codes become
//! instructions that steer the next reply without being recorded as
//! something the user said. Malformed packets are logged and dropped.

use std::str::FromStr;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{OrchestratorHandle, Trigger};
use crate::room::{CHAT_TOPIC, DataPacket, GESTURE_TOPIC, RoomEvent};

/// Why an inbound packet could not be turned into an event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("payload is empty")]
    Empty,

    #[error("unrecognized gesture code: {0}")]
    UnknownGesture(String),

    #[error("no handler for topic: {0}")]
    UnknownTopic(String),
}

/// Recognized hand gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    OpenPalm,
    ClosedFist,
    ThumbUp,
}

impl Gesture {
    /// Wire code for this gesture
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::OpenPalm => "open_palm",
            Self::ClosedFist => "closed_fist",
            Self::ThumbUp => "thumb_up",
        }
    }

    /// Direction given to the assistant when the gesture is seen
    #[must_use]
    pub const fn instruction(self) -> &'static str {
        match self {
            Self::OpenPalm => {
                "The user raised an open palm to get your attention. Stop what you \
                 were saying and briefly ask how you can help."
            }
            Self::ClosedFist => {
                "The user made a closed fist, asking you to hold on. Acknowledge in \
                 a few words and wait for them to speak."
            }
            Self::ThumbUp => {
                "The user gave a thumbs up. Acknowledge their approval in one short \
                 sentence."
            }
        }
    }
}

impl FromStr for Gesture {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open_palm" => Ok(Self::OpenPalm),
            "closed_fist" => Ok(Self::ClosedFist),
            "thumb_up" => Ok(Self::ThumbUp),
            "" => Err(DecodeError::Empty),
            other => Err(DecodeError::UnknownGesture(other.to_string())),
        }
    }
}

/// A decoded out-of-band event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEvent {
    Chat { text: String, sender: Option<String> },
    Gesture(Gesture),
}

impl ExternalEvent {
    /// Decode a data packet by topic
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for unknown topics, non-UTF-8 or empty
    /// payloads, and unrecognized gesture codes
    pub fn decode(packet: &DataPacket) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(&packet.payload).map_err(|_| DecodeError::NotUtf8)?;

        match packet.topic.as_str() {
            CHAT_TOPIC => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(DecodeError::Empty);
                }
                Ok(Self::Chat {
                    text: text.to_string(),
                    sender: packet.sender.clone(),
                })
            }
            GESTURE_TOPIC => text.parse().map(Self::Gesture),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }

    #[must_use]
    pub fn into_trigger(self) -> Trigger {
        match self {
            Self::Chat { text, .. } => Trigger::chat(text),
            Self::Gesture(gesture) => Trigger::gesture(gesture.instruction()),
        }
    }
}

/// Listener task feeding decoded events to the orchestrator
pub struct EventChannel {
    orchestrator: OrchestratorHandle,
}

impl EventChannel {
    #[must_use]
    pub const fn new(orchestrator: OrchestratorHandle) -> Self {
        Self { orchestrator }
    }

    /// Handle one inbound packet; returns whether a turn was requested
    pub fn dispatch(&self, packet: &DataPacket) -> bool {
        let event = match ExternalEvent::decode(packet) {
            Ok(event) => event,
            Err(DecodeError::UnknownGesture(code)) => {
                tracing::debug!(code = %code, "ignoring unrecognized gesture");
                return false;
            }
            Err(DecodeError::UnknownTopic(topic)) => {
                tracing::trace!(topic = %topic, "ignoring packet on unhandled topic");
                return false;
            }
            Err(e) => {
                tracing::warn!(topic = %packet.topic, bytes = packet.payload.len(), error = %e, "dropping malformed packet");
                return false;
            }
        };

        match &event {
            ExternalEvent::Chat { text, sender } => {
                tracing::info!(sender = sender.as_deref().unwrap_or("unknown"), chars = text.len(), "chat injection");
            }
            ExternalEvent::Gesture(gesture) => tracing::info!(gesture = gesture.code(), "gesture received"),
        }

        match self.orchestrator.start_turn(event.into_trigger()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "could not start turn for external event");
                false
            }
        }
    }

    /// Consume room events until shutdown or until the room closes
    pub async fn run(self, mut events: broadcast::Receiver<RoomEvent>, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(RoomEvent::Data(packet)) => {
                    self.dispatch(&packet);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event channel lagged, packets lost");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("event channel stopped");
    }
}
