//! In-process rooms

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use super::{DataPacket, Room, RoomEvent};
use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 256;

/// Traffic the agent sent into the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomOutput {
    Data { topic: String, payload: Vec<u8> },
    Audio(Vec<u8>),
}

/// A room living entirely inside this process
#[derive(Debug)]
pub struct LocalRoom {
    name: String,
    identity: String,
    events: broadcast::Sender<RoomEvent>,
    output: broadcast::Sender<RoomOutput>,
}

impl LocalRoom {
    #[must_use]
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (output, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            identity: identity.into(),
            events,
            output,
        }
    }

    /// Deliver an event to everyone subscribed to this room
    ///
    /// Returns the number of subscribers reached.
    pub fn inject(&self, event: RoomEvent) -> usize {
        self.events.send(event).unwrap_or_else(|_| {
            tracing::debug!(room = %self.name, "event dropped, nobody is listening");
            0
        })
    }

    /// Deliver a data packet from another participant
    pub fn inject_data(&self, topic: &str, payload: Vec<u8>, sender: Option<String>) -> usize {
        self.inject(RoomEvent::Data(DataPacket {
            topic: topic.to_string(),
            payload,
            sender,
        }))
    }

    /// Observe what the agent publishes
    #[must_use]
    pub fn output(&self) -> broadcast::Receiver<RoomOutput> {
        self.output.subscribe()
    }

    fn emit(&self, out: RoomOutput) {
        // No observers is fine; the room still accepted the publish
        let _ = self.output.send(out);
    }
}

#[async_trait]
impl Room for LocalRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    async fn publish_data(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if topic.is_empty() {
            return Err(Error::Room("topic must not be empty".to_string()));
        }
        self.emit(RoomOutput::Data {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn publish_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.emit(RoomOutput::Audio(chunk));
        Ok(())
    }
}

/// Rooms keyed by name
#[derive(Debug, Default, Clone)]
pub struct RoomHub {
    rooms: Arc<RwLock<HashMap<String, Arc<LocalRoom>>>>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a room for `identity`, or return the existing one
    pub async fn open(&self, name: &str, identity: &str) -> Arc<LocalRoom> {
        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(room = name, "room opened");
            Arc::new(LocalRoom::new(name, identity))
        }))
    }

    pub async fn get(&self, name: &str) -> Option<Arc<LocalRoom>> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Remove a room; returns whether it existed
    pub async fn close(&self, name: &str) -> bool {
        let removed = self.rooms.write().await.remove(name).is_some();
        if removed {
            tracing::info!(room = name, "room closed");
        }
        removed
    }

    pub async fn names(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::CHAT_TOPIC;

    #[tokio::test]
    async fn injected_events_reach_subscribers() {
        let room = LocalRoom::new("lab", "ada");
        let mut events = room.subscribe();

        assert_eq!(room.inject_data(CHAT_TOPIC, b"hi".to_vec(), Some("API_User".into())), 1);
        let RoomEvent::Data(packet) = events.recv().await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(packet.topic, CHAT_TOPIC);
        assert_eq!(packet.payload, b"hi");
    }

    #[tokio::test]
    async fn publishes_are_observable() {
        let room = LocalRoom::new("lab", "ada");
        let mut output = room.output();

        room.publish_data("system_stats", b"{}".to_vec()).await.unwrap();
        room.publish_audio(vec![0; 4]).await.unwrap();

        assert!(matches!(output.recv().await.unwrap(), RoomOutput::Data { topic, .. } if topic == "system_stats"));
        assert_eq!(output.recv().await.unwrap(), RoomOutput::Audio(vec![0; 4]));
        assert!(room.publish_data("", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn hub_reuses_rooms_by_name() {
        let hub = RoomHub::new();
        let a = hub.open("lab", "ada").await;
        let b = hub.open("lab", "someone-else").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(hub.get("kitchen").await.is_none());
        assert!(hub.close("lab").await);
        assert!(hub.get("lab").await.is_none());
    }
}
