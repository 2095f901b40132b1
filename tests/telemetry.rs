//! Telemetry broadcaster integration tests

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ada_agent::room::{Room, RoomOutput, TELEMETRY_TOPIC};
use ada_agent::telemetry::TelemetryBroadcaster;
use ada_agent::{Trigger, TurnState};
use tokio_util::sync::CancellationToken;

mod common;
use common::{Harness, MockSampler, ScriptedReasoner, wait_for_state};

#[tokio::test(start_paused = true)]
async fn test_publishes_on_cadence_while_agent_speaks() {
    let harness = Harness::new(ScriptedReasoner::silent());
    harness.synthesizer.hold("A very long greeting.");
    let mut output = harness.room.output();

    // Keep the orchestrator busy for the whole run
    let (orchestrator, handle) = harness.orchestrator();
    let token = CancellationToken::new();
    orchestrator.spawn(token.clone());
    handle.start_turn(Trigger::greeting("A very long greeting.")).unwrap();
    wait_for_state(&handle, TurnState::Speaking).await;

    let sampler = Arc::new(MockSampler::default());
    let room: Arc<dyn Room> = harness.room.clone();
    let broadcaster = TelemetryBroadcaster::new(sampler.clone(), room, Duration::from_secs(2));
    let telemetry = tokio::spawn(broadcaster.run(token.child_token()));

    tokio::time::sleep(Duration::from_secs(10)).await;
    token.cancel();
    let published = telemetry.await.unwrap();

    assert!((4..=6).contains(&published), "published {published} samples");
    assert_eq!(sampler.samples.load(Ordering::SeqCst), published);

    let mut stats = Vec::new();
    while let Ok(out) = output.try_recv() {
        if let RoomOutput::Data { topic, payload } = out {
            assert_eq!(topic, TELEMETRY_TOPIC);
            stats.push(serde_json::from_slice::<serde_json::Value>(&payload).unwrap());
        }
    }
    assert_eq!(stats.len(), published);
    assert_eq!(stats[0]["cpu"], 12.5);
    assert_eq!(stats[0]["memory"], 40.0);
}
