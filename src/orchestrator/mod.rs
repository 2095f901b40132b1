//! Turn orchestrator
//!
//! A single task owns the session's conversation history and the active turn.
//! Everything else talks to it through [`OrchestratorHandle`], which feeds one
//! command queue. Collaborator calls (transcription, reasoning, tools,
//! synthesis) run on their own tasks and post their results back as commands
//! tagged with the generation of the turn that started them; a result whose
//! turn is no longer active is dropped without touching history.
//!
//! ```text
//! Idle ─► Listening ─► Transcribing ─► Reasoning ⇄ ToolExecuting
//!                                          │
//!                                          ▼
//!            Idle ◄──── Speaking ◄──── Synthesizing
//!
//! Reasoning │ ToolExecuting │ Synthesizing │ Speaking ─► Interrupted ─► Idle
//! ```

mod turn;

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

pub use turn::{Trigger, TriggerKind, TurnInput, TurnState};

use crate::agent::{DEFAULT_SYSTEM_PROMPT, Reasoner, ReasoningRequest, ReasoningResponse};
use crate::conversation::{ConversationMessage, History, ToolCall};
use crate::room::Room;
use crate::tools::{ToolInvocation, ToolRegistry};
use crate::voice::{AudioClip, AudioStream, Synthesizer, Transcriber};
use crate::{Error, Result};
use turn::Turn;

/// Spoken when collaborators keep failing
pub const APOLOGY: &str = "Sorry, I ran into a problem. Could you try again?";

/// Spoken when an utterance could not be transcribed
pub const NOT_HEARD: &str = "Sorry, I didn't catch that.";

/// External services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub reasoner: Arc<dyn Reasoner>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub room: Arc<dyn Room>,
}

/// Turn policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    /// Tool-call rounds allowed per turn
    pub max_tool_rounds: u32,
    /// Retries per collaborator step before apologizing
    pub max_provider_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: 4,
            max_provider_retries: 1,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: TurnState,
    /// Generation of the most recently started turn
    pub generation: u64,
    pub history: Vec<ConversationMessage>,
}

/// Outcome of one tool-call round
#[derive(Debug)]
struct ToolBatch {
    text: String,
    calls: Vec<ToolCall>,
    invocations: Vec<ToolInvocation>,
}

enum Command {
    StartTurn(Trigger),
    Interrupt(oneshot::Sender<()>),
    SpeechStarted,
    UtteranceEnded(AudioClip),
    Snapshot(oneshot::Sender<Snapshot>),
    Transcribed { epoch: u64, result: Result<String> },
    Reasoned { generation: u64, result: Result<ReasoningResponse> },
    ToolsResolved { generation: u64, result: Result<ToolBatch> },
    Synthesized { generation: u64, result: Result<AudioStream> },
    PlaybackEnded { generation: u64, result: Result<()> },
}

/// Cloneable command surface of a running orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TurnState>,
}

impl OrchestratorHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Session("orchestrator is not running".to_string()))
    }

    /// Request a new turn
    ///
    /// Supersedes any interruptible turn in flight. Ignored (and logged) while
    /// a non-interruptible turn is committing.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator has stopped
    pub fn start_turn(&self, trigger: Trigger) -> Result<()> {
        self.send(Command::StartTurn(trigger))
    }

    /// Cancel the active turn and wait until its output has been torn down
    ///
    /// A no-op when nothing is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator has stopped
    pub async fn interrupt(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Interrupt(ack))?;
        done.await
            .map_err(|_| Error::Session("orchestrator stopped during interrupt".to_string()))
    }

    /// Voice activity began
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator has stopped
    pub fn speech_started(&self) -> Result<()> {
        self.send(Command::SpeechStarted)
    }

    /// Voice activity ended with a complete utterance
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator has stopped
    pub fn utterance_ended(&self, clip: AudioClip) -> Result<()> {
        self.send(Command::UtteranceEnded(clip))
    }

    /// # Errors
    ///
    /// Returns an error if the orchestrator has stopped
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await
            .map_err(|_| Error::Session("orchestrator stopped".to_string()))
    }

    #[must_use]
    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Follow state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.state.clone()
    }
}

struct Playback {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of one session's turn state machine
pub struct Orchestrator {
    collaborators: Collaborators,
    config: OrchestratorConfig,
    tools: Arc<ToolRegistry>,
    commands: mpsc::UnboundedReceiver<Command>,
    loopback: mpsc::WeakUnboundedSender<Command>,
    state_tx: watch::Sender<TurnState>,
    state: TurnState,
    history: History,
    generation: u64,
    active: Option<Turn>,
    listen_epoch: u64,
    playback: Option<Playback>,
    work: JoinSet<()>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: OrchestratorConfig) -> (Self, OrchestratorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TurnState::Idle);

        let orchestrator = Self {
            collaborators,
            config,
            tools: Arc::new(ToolRegistry::new()),
            commands: rx,
            loopback: tx.downgrade(),
            state_tx,
            state: TurnState::Idle,
            history: History::new(),
            generation: 0,
            active: None,
            listen_epoch: 0,
            playback: None,
            work: JoinSet::new(),
        };

        let handle = OrchestratorHandle {
            commands: tx,
            state: state_rx,
        };

        (orchestrator, handle)
    }

    /// Tools offered to the reasoning engine
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Run on a new task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<History> {
        tokio::spawn(self.run(shutdown))
    }

    /// Drain commands until shutdown (or until every handle is dropped)
    ///
    /// Returns the final conversation history.
    pub async fn run(mut self, shutdown: CancellationToken) -> History {
        tracing::info!(tools = self.tools.len(), "orchestrator started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                Some(joined) = self.work.join_next(), if !self.work.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "orchestrator worker failed");
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.stop_playback().await;
        self.active = None;
        self.work.shutdown().await;
        self.set_state(TurnState::Idle);
        tracing::info!(messages = self.history.len(), "orchestrator stopped");
        self.history
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::StartTurn(trigger) => self.start_turn(trigger).await,
            Command::Interrupt(ack) => {
                self.interrupt().await;
                let _ = ack.send(());
            }
            Command::SpeechStarted => self.on_speech_started().await,
            Command::UtteranceEnded(clip) => self.on_utterance_ended(clip),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Transcribed { epoch, result } => self.on_transcribed(epoch, result).await,
            Command::Reasoned { generation, result } => self.on_reasoning_result(generation, result),
            Command::ToolsResolved { generation, result } => self.on_tools_resolved(generation, result),
            Command::Synthesized { generation, result } => {
                self.on_synthesis_ready(generation, result).await;
            }
            Command::PlaybackEnded { generation, result } => {
                self.on_speech_complete(generation, result).await;
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            generation: self.generation,
            history: self.history.messages().to_vec(),
        }
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "state change");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    /// The active turn, if it is still the one that started `generation`
    fn current(&mut self, generation: u64) -> Option<&mut Turn> {
        self.active.as_mut().filter(|t| t.generation == generation)
    }

    async fn start_turn(&mut self, trigger: Trigger) {
        if let Some(active) = &self.active {
            if !active.trigger.is_interruptible() {
                tracing::info!(
                    kind = %trigger.kind(),
                    active = active.generation,
                    "trigger rejected, non-interruptible turn in flight"
                );
                return;
            }
            tracing::debug!(superseded = active.generation, kind = %trigger.kind(), "trigger supersedes active turn");
            self.interrupt().await;
        }

        if self.state == TurnState::Transcribing {
            self.listen_epoch += 1;
            tracing::debug!("pending transcription dropped");
        }

        self.generation += 1;
        let turn = Turn::new(self.generation, trigger);
        tracing::info!(generation = turn.generation, kind = %turn.trigger.kind(), "turn started");

        let input = turn.trigger.input().clone();
        self.active = Some(turn);
        match input {
            TurnInput::User(text) => {
                self.history.push(ConversationMessage::user(text));
                self.begin_reasoning();
            }
            TurnInput::Instruction(_) => self.begin_reasoning(),
            TurnInput::Say(text) => self.begin_synthesis(text),
        }
    }

    async fn interrupt(&mut self) {
        let Some(turn) = self.active.take() else {
            tracing::debug!(state = %self.state, "interrupt ignored, no active turn");
            return;
        };

        let was = self.state;
        self.set_state(TurnState::Interrupted);
        self.stop_playback().await;
        tracing::info!(
            generation = turn.generation,
            state = %was,
            in_flight = was.is_committing(),
            "turn interrupted"
        );
        self.set_state(TurnState::Idle);
    }

    fn finish_turn(&mut self) {
        if let Some(turn) = self.active.take() {
            tracing::debug!(generation = turn.generation, "turn finished");
        }
        self.set_state(TurnState::Idle);
    }

    /// Run collaborator work off the command loop and post its result back
    fn spawn_work<T, F>(&mut self, work: F, done: impl FnOnce(Result<T>) -> Command + Send + 'static)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let Some(loopback) = self.loopback.upgrade() else {
            tracing::debug!("orchestrator closing, work not started");
            return;
        };

        self.work.spawn(async move {
            // A panicking collaborator surfaces as a failed step
            let result = AbortOnDropHandle::new(tokio::spawn(work))
                .await
                .unwrap_or_else(|e| Err(Error::Session(format!("collaborator task failed: {e}"))));
            let _ = loopback.send(done(result));
        });
    }

    fn begin_reasoning(&mut self) {
        let Some(turn) = &self.active else { return };
        let generation = turn.generation;
        let request = ReasoningRequest {
            system_prompt: self.config.system_prompt.clone(),
            instruction: turn.instruction(),
            history: self.history.messages().to_vec(),
            tools: self.tools.specs(),
        };

        self.set_state(TurnState::Reasoning);
        let reasoner = Arc::clone(&self.collaborators.reasoner);
        self.spawn_work(
            async move { reasoner.reason(&request).await },
            move |result| Command::Reasoned { generation, result },
        );
    }

    fn on_reasoning_result(&mut self, generation: u64, result: Result<ReasoningResponse>) {
        let max_retries = self.config.max_provider_retries;
        let max_rounds = self.config.max_tool_rounds;
        let Some(turn) = self.current(generation) else {
            tracing::debug!(generation, "discarding superseded reasoning result");
            return;
        };

        let response = match result {
            Ok(response) => {
                turn.failures = 0;
                response
            }
            Err(e) => {
                turn.failures += 1;
                if turn.failures <= max_retries {
                    tracing::warn!(generation, attempt = turn.failures, error = %e, "reasoning failed, retrying");
                    self.begin_reasoning();
                } else {
                    tracing::warn!(generation, error = %e, "reasoning failed");
                    self.apologize();
                }
                return;
            }
        };

        if !response.text.trim().is_empty() {
            turn.last_text.clone_from(&response.text);
        }

        if response.has_tool_calls() {
            if turn.rounds >= max_rounds {
                tracing::warn!(generation, rounds = turn.rounds, "tool round limit reached");
                let text = if turn.last_text.is_empty() {
                    APOLOGY.to_string()
                } else {
                    turn.last_text.clone()
                };
                self.begin_synthesis(text);
                return;
            }
            turn.rounds += 1;
            self.begin_tools(generation, response);
        } else if response.text.trim().is_empty() {
            tracing::info!(generation, "reasoning produced nothing to say");
            self.finish_turn();
        } else {
            self.begin_synthesis(response.text);
        }
    }

    fn begin_tools(&mut self, generation: u64, response: ReasoningResponse) {
        self.set_state(TurnState::ToolExecuting);

        let ReasoningResponse { text, tool_calls } = response;
        tracing::debug!(generation, calls = tool_calls.len(), "executing tool calls");

        let tools = Arc::clone(&self.tools);
        self.spawn_work(
            async move {
                // Calls run one at a time, in the order the model listed them
                let mut invocations = Vec::with_capacity(tool_calls.len());
                for call in &tool_calls {
                    invocations.push(tools.resolve(call).await);
                }
                Ok(ToolBatch {
                    text,
                    calls: tool_calls,
                    invocations,
                })
            },
            move |result| Command::ToolsResolved { generation, result },
        );
    }

    fn on_tools_resolved(&mut self, generation: u64, result: Result<ToolBatch>) {
        if self.current(generation).is_none() {
            // Side effects already happened; only the history entries are dropped
            tracing::debug!(generation, "discarding superseded tool results");
            return;
        }

        match result {
            Ok(batch) => {
                let failed = batch.invocations.iter().filter(|i| i.is_error()).count();
                tracing::debug!(generation, calls = batch.calls.len(), failed, "tool round complete");
                self.history
                    .push(ConversationMessage::assistant_tool_calls(batch.text, batch.calls));
                self.history
                    .extend(batch.invocations.iter().map(ToolInvocation::to_message));
                self.begin_reasoning();
            }
            Err(e) => {
                tracing::error!(generation, error = %e, "tool round failed");
                self.apologize();
            }
        }
    }

    /// Fall back to the fixed apology; abandon the turn if that fails too
    fn apologize(&mut self) {
        let Some(turn) = self.active.as_mut() else { return };
        if turn.apologizing {
            tracing::warn!(generation = turn.generation, "apology failed, abandoning turn");
            self.finish_turn();
            return;
        }
        turn.apologizing = true;
        turn.failures = 0;
        self.begin_synthesis(APOLOGY.to_string());
    }

    fn begin_synthesis(&mut self, text: String) {
        let Some(turn) = self.active.as_mut() else { return };
        let generation = turn.generation;
        turn.reply.clone_from(&text);

        self.set_state(TurnState::Synthesizing);
        let synthesizer = Arc::clone(&self.collaborators.synthesizer);
        self.spawn_work(
            async move { synthesizer.synthesize(&text).await },
            move |result| Command::Synthesized { generation, result },
        );
    }

    async fn on_synthesis_ready(&mut self, generation: u64, result: Result<AudioStream>) {
        let max_retries = self.config.max_provider_retries;
        let Some(turn) = self.current(generation) else {
            tracing::debug!(generation, "discarding superseded synthesis");
            return;
        };

        match result {
            Ok(stream) => {
                turn.failures = 0;
                self.stop_playback().await;
                self.set_state(TurnState::Speaking);
                self.start_playback(generation, stream);
            }
            Err(e) => {
                turn.failures += 1;
                if turn.failures <= max_retries {
                    tracing::warn!(generation, attempt = turn.failures, error = %e, "synthesis failed, retrying");
                    let text = turn.reply.clone();
                    self.begin_synthesis(text);
                } else {
                    tracing::warn!(generation, error = %e, "synthesis failed");
                    self.apologize();
                }
            }
        }
    }

    fn start_playback(&mut self, generation: u64, stream: AudioStream) {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let room = Arc::clone(&self.collaborators.room);
        let loopback = self.loopback.upgrade();

        let handle = tokio::spawn(async move {
            if let Some(result) = play(stream, room.as_ref(), &cancel).await
                && let Some(loopback) = loopback
            {
                let _ = loopback.send(Command::PlaybackEnded { generation, result });
            }
        });

        self.playback = Some(Playback { token, handle });
    }

    /// Cancel the output stream and wait for the playback task to exit
    async fn stop_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.token.cancel();
            if let Err(e) = playback.handle.await {
                tracing::warn!(error = %e, "playback task failed");
            }
        }
    }

    async fn on_speech_complete(&mut self, generation: u64, result: Result<()>) {
        let Some(turn) = self.current(generation) else {
            tracing::debug!(generation, "discarding superseded playback completion");
            return;
        };
        let message = turn.spoken_message();

        self.stop_playback().await;
        match result {
            Ok(()) => {
                self.history.push(message);
                tracing::info!(generation, "turn complete");
            }
            Err(e) => tracing::warn!(generation, error = %e, "playback failed, reply not recorded"),
        }
        self.finish_turn();
    }

    async fn on_speech_started(&mut self) {
        match self.state {
            TurnState::Speaking => {
                if self.active.as_ref().is_some_and(|t| t.trigger.is_interruptible()) {
                    tracing::info!("barge-in");
                    self.interrupt().await;
                    self.set_state(TurnState::Listening);
                } else {
                    tracing::debug!("barge-in ignored, turn is non-interruptible");
                }
            }
            TurnState::Idle => self.set_state(TurnState::Listening),
            state => tracing::debug!(%state, "speech start ignored"),
        }
    }

    fn on_utterance_ended(&mut self, clip: AudioClip) {
        if !matches!(self.state, TurnState::Listening | TurnState::Idle) {
            tracing::debug!(state = %self.state, "utterance ignored");
            return;
        }

        self.listen_epoch += 1;
        let epoch = self.listen_epoch;
        self.set_state(TurnState::Transcribing);

        let transcriber = Arc::clone(&self.collaborators.transcriber);
        self.spawn_work(
            async move { transcriber.transcribe(&clip).await },
            move |result| Command::Transcribed { epoch, result },
        );
    }

    async fn on_transcribed(&mut self, epoch: u64, result: Result<String>) {
        if epoch != self.listen_epoch || self.state != TurnState::Transcribing {
            tracing::debug!(epoch, "discarding stale transcript");
            return;
        }

        match result {
            Ok(text) if !text.trim().is_empty() => {
                self.start_turn(Trigger::speech(text.trim())).await;
            }
            Ok(_) => {
                tracing::debug!("empty transcript");
                self.set_state(TurnState::Idle);
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                self.start_turn(Trigger::notice(NOT_HEARD)).await;
            }
        }
    }
}

/// Forward audio chunks to the room until the stream ends or is cancelled
///
/// Returns `None` when cancelled.
async fn play(mut stream: AudioStream, room: &dyn Room, cancel: &CancellationToken) -> Option<Result<()>> {
    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            chunk = stream.next() => chunk,
        };

        match chunk {
            None => return Some(Ok(())),
            Some(Err(e)) => return Some(Err(e)),
            Some(Ok(bytes)) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return None,
                    published = room.publish_audio(bytes) => {
                        if let Err(e) = published {
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}
