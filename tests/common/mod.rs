//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ada_agent::agent::{Reasoner, ReasoningRequest, ReasoningResponse};
use ada_agent::orchestrator::{Collaborators, Orchestrator, OrchestratorConfig, OrchestratorHandle, Snapshot};
use ada_agent::room::{LocalRoom, Room};
use ada_agent::telemetry::{MetricsSampler, TelemetrySample};
use ada_agent::voice::{AudioClip, AudioStream, Synthesizer, Transcriber};
use ada_agent::{Error, Result, ToolCall, TurnState};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

/// One scripted reasoning step
pub enum Step {
    Reply(ReasoningResponse),
    Fail,
    /// Reply after a delay
    Slow(Duration, ReasoningResponse),
}

/// Reasoner that replays a script and records what it was asked
#[derive(Default)]
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A reasoner with no script; every call answers "Okay."
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(response)) => Ok(response),
            Some(Step::Fail) => Err(Error::Reasoning("scripted failure".to_string())),
            Some(Step::Slow(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(ReasoningResponse::text("Okay.")),
        }
    }
}

pub fn reply(text: &str) -> Step {
    Step::Reply(ReasoningResponse::text(text))
}

pub fn call(id: &str, name: &str, arguments: Value) -> Step {
    Step::Reply(ReasoningResponse::tool_calls(vec![ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }]))
}

/// One response carrying several tool calls, in order
pub fn batch(calls: &[(&str, &str, Value)]) -> Step {
    Step::Reply(ReasoningResponse::tool_calls(
        calls
            .iter()
            .map(|(id, name, arguments)| ToolCall {
                id: (*id).to_string(),
                name: (*name).to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
    ))
}

/// Synthesizer that "speaks" text as a single chunk of its bytes
///
/// Texts listed with `hold` play one chunk and then never finish, which
/// keeps the orchestrator in `Speaking` until something interrupts it.
#[derive(Default)]
pub struct MockSynthesizer {
    spoken: Mutex<Vec<String>>,
    hold: Mutex<HashSet<String>>,
    failures: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hold(&self, text: &str) {
        self.hold.lock().unwrap().insert(text.to_string());
    }

    /// Fail the next `n` requests
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Tts("scripted failure".to_string()));
        }

        self.spoken.lock().unwrap().push(text.to_string());
        let chunk = futures::stream::iter([Ok(text.as_bytes().to_vec())]);
        if self.hold.lock().unwrap().contains(text) {
            Ok(chunk.chain(futures::stream::pending()).boxed())
        } else {
            Ok(chunk.boxed())
        }
    }
}

/// Transcriber returning a fixed transcript, or failing when given `None`
pub struct MockTranscriber {
    transcript: Option<String>,
}

impl MockTranscriber {
    pub fn says(text: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Some(text.to_string()),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self { transcript: None })
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String> {
        self.transcript
            .clone()
            .ok_or_else(|| Error::Stt("scripted failure".to_string()))
    }
}

/// Sampler returning a fixed reading
#[derive(Default)]
pub struct MockSampler {
    pub samples: AtomicUsize,
}

impl MetricsSampler for MockSampler {
    fn sample(&self) -> Result<TelemetrySample> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        Ok(TelemetrySample {
            cpu_pct: 12.5,
            memory_pct: 40.0,
            gpu_pct: 0.0,
            timestamp: chrono::Utc::now(),
        })
    }
}

/// A session's worth of mocks
pub struct Harness {
    pub reasoner: Arc<ScriptedReasoner>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub room: Arc<LocalRoom>,
    pub collaborators: Collaborators,
}

impl Harness {
    pub fn new(reasoner: Arc<ScriptedReasoner>) -> Self {
        Self::with_transcriber(reasoner, MockTranscriber::says("hello"))
    }

    pub fn with_transcriber(reasoner: Arc<ScriptedReasoner>, transcriber: Arc<dyn Transcriber>) -> Self {
        let synthesizer = MockSynthesizer::new();
        let room = Arc::new(LocalRoom::new("test-room", "ada-agent"));
        let collaborators = Collaborators {
            reasoner: reasoner.clone(),
            synthesizer: synthesizer.clone(),
            transcriber,
            room: room.clone() as Arc<dyn Room>,
        };
        Self {
            reasoner,
            synthesizer,
            room,
            collaborators,
        }
    }

    pub fn orchestrator(&self) -> (Orchestrator, OrchestratorHandle) {
        Orchestrator::new(self.collaborators.clone(), OrchestratorConfig::default())
    }
}

/// Poll snapshots until `done` holds
pub async fn wait_until(handle: &OrchestratorHandle, done: impl Fn(&Snapshot) -> bool) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

/// Wait until the orchestrator is in `state`
pub async fn wait_for_state(handle: &OrchestratorHandle, state: TurnState) -> Snapshot {
    wait_until(handle, |s| s.state == state).await
}

/// Wait until the orchestrator is idle with `len` messages of history
pub async fn wait_for_history(handle: &OrchestratorHandle, len: usize) -> Snapshot {
    wait_until(handle, |s| s.state == TurnState::Idle && s.history.len() >= len).await
}
