//! Session supervisor integration tests

use std::sync::Arc;
use std::time::Duration;

use ada_agent::SessionSupervisor;
use ada_agent::room::{CHAT_TOPIC, RoomEvent, RoomOutput};
use ada_agent::Role;
use tokio_util::sync::CancellationToken;

mod common;
use common::{Harness, MockSampler, ScriptedReasoner, reply};

#[tokio::test]
async fn test_session_greets_serves_chat_and_tears_down() {
    let harness = Harness::new(ScriptedReasoner::new([reply("Four.")]));
    let dir = tempfile::tempdir().unwrap();
    let supervisor = SessionSupervisor::new(harness.collaborators.clone(), Arc::new(MockSampler::default()))
        .greeting("Hello there.")
        .telemetry_interval(Duration::from_millis(50))
        .data_dir(dir.path().to_path_buf());

    let mut output = harness.room.output();
    let shutdown = CancellationToken::new();
    let room = harness.room.clone();

    let driver = tokio::spawn(async move {
        // Let the supervisor subscribe before anyone joins
        tokio::time::sleep(Duration::from_millis(50)).await;
        room.inject(RoomEvent::ParticipantJoined("alice".to_string()));

        // Wait for the greeting audio before chatting
        loop {
            if let RoomOutput::Audio(chunk) = output.recv().await.unwrap()
                && chunk == b"Hello there."
            {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        room.inject_data(CHAT_TOPIC, b"what is two plus two?".to_vec(), Some("alice".to_string()));

        loop {
            if let RoomOutput::Audio(chunk) = output.recv().await.unwrap()
                && chunk == b"Four."
            {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        room.inject(RoomEvent::ParticipantLeft("alice".to_string()));
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), supervisor.run_once(&shutdown))
        .await
        .unwrap()
        .unwrap()
        .expect("a participant joined");
    driver.await.unwrap();

    assert_eq!(summary.participant, "alice");
    let history: Vec<_> = summary
        .history
        .messages()
        .iter()
        .map(|m| (m.role(), m.content().to_string()))
        .collect();
    assert_eq!(
        history,
        vec![
            (Role::Assistant, "Hello there.".to_string()),
            (Role::User, "what is two plus two?".to_string()),
            (Role::Assistant, "Four.".to_string()),
        ]
    );
    assert_eq!(harness.reasoner.calls(), 1);
    // Built-in tools were offered to the reasoner
    let tools: Vec<_> = harness.reasoner.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert!(tools.contains(&"set_timer".to_string()));
    assert!(tools.contains(&"get_system_info".to_string()));
}

#[tokio::test]
async fn test_shutdown_before_anyone_joins() {
    let harness = Harness::new(ScriptedReasoner::silent());
    let supervisor = SessionSupervisor::new(harness.collaborators.clone(), Arc::new(MockSampler::default()));
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    assert!(supervisor.run_once(&shutdown).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_ends_running_session() {
    let harness = Harness::new(ScriptedReasoner::silent());
    harness.synthesizer.hold("Hello there.");
    let supervisor = SessionSupervisor::new(harness.collaborators.clone(), Arc::new(MockSampler::default()))
        .greeting("Hello there.");
    let shutdown = CancellationToken::new();

    let room = harness.room.clone();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        room.inject(RoomEvent::ParticipantJoined("bob".to_string()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), supervisor.run_once(&shutdown))
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // The greeting was cut off, so nothing was recorded
    assert!(summary.history.is_empty());
}

#[tokio::test]
async fn test_chat_sent_right_after_join_is_delivered() {
    let harness = Harness::new(ScriptedReasoner::silent());
    let dir = tempfile::tempdir().unwrap();
    let supervisor = SessionSupervisor::new(harness.collaborators.clone(), Arc::new(MockSampler::default()))
        .greeting("Hello there.")
        .data_dir(dir.path().to_path_buf());
    let shutdown = CancellationToken::new();

    let room = harness.room.clone();
    let driver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // No yield between the two, so the packet lands before the join is handled
        room.inject(RoomEvent::ParticipantJoined("carol".to_string()));
        room.inject_data(CHAT_TOPIC, b"are you there?".to_vec(), Some("carol".to_string()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        room.inject(RoomEvent::ParticipantLeft("carol".to_string()));
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), supervisor.run_once(&shutdown))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    driver.await.unwrap();

    // The user message is recorded whether or not the greeting superseded the turn
    assert!(
        summary
            .history
            .messages()
            .iter()
            .any(|m| m.role() == Role::User && m.content() == "are you there?")
    );
}
