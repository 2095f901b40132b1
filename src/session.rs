//! Session supervisor
//!
//! Waits for a participant to join the room, then runs one session: the
//! orchestrator plus its background tasks (telemetry, external events and the
//! room event pump). The session ends when that participant leaves or on
//! shutdown, and every task it started is stopped before `run_once` returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_GREETING};
use crate::conversation::History;
use crate::events::EventChannel;
use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorConfig, OrchestratorHandle, Trigger};
use crate::room::{Room, RoomEvent};
use crate::telemetry::{MetricsSampler, SysinfoSampler, TelemetryBroadcaster};
use crate::timer::TimerService;
use crate::tools::{BuiltinTools, ToolRegistry};
use crate::{Error, Result};

/// Default telemetry cadence
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of a finished session
#[derive(Debug)]
pub struct SessionSummary {
    pub id: Uuid,
    pub participant: String,
    pub history: History,
}

/// Owns session lifecycles for one room
pub struct SessionSupervisor {
    collaborators: Collaborators,
    policy: OrchestratorConfig,
    sampler: Arc<dyn MetricsSampler>,
    greeting: String,
    telemetry_interval: Duration,
    data_dir: PathBuf,
}

impl SessionSupervisor {
    #[must_use]
    pub fn new(collaborators: Collaborators, sampler: Arc<dyn MetricsSampler>) -> Self {
        Self {
            collaborators,
            policy: OrchestratorConfig::default(),
            sampler,
            greeting: DEFAULT_GREETING.to_string(),
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            data_dir: std::env::temp_dir().join("ada"),
        }
    }

    /// Build a supervisor with providers selected by `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a selected provider has no API key
    pub fn from_config(config: &Config, room: Arc<dyn Room>) -> Result<Self> {
        let collaborators = Collaborators {
            reasoner: config.reasoner()?,
            synthesizer: config.synthesizer()?,
            transcriber: config.transcriber()?,
            room,
        };

        Ok(Self::new(collaborators, Arc::new(SysinfoSampler::new()))
            .policy(config.orchestrator_config())
            .greeting(config.session.greeting.clone())
            .telemetry_interval(config.session.telemetry_interval)
            .data_dir(config.data_dir.clone()))
    }

    #[must_use]
    pub fn policy(mut self, policy: OrchestratorConfig) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    #[must_use]
    pub fn telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = dir;
        self
    }

    fn room(&self) -> &Arc<dyn Room> {
        &self.collaborators.room
    }

    /// Run back-to-back sessions until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the room closes or a session fails to start
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        while let Some(summary) = self.run_once(&shutdown).await? {
            tracing::info!(
                session = %summary.id,
                participant = %summary.participant,
                messages = summary.history.len(),
                "session ended"
            );
        }
        Ok(())
    }

    /// Wait for a participant and run a single session
    ///
    /// Returns `None` if shutdown arrives before anyone joins.
    ///
    /// # Errors
    ///
    /// Returns an error if the room closes while waiting, the tools can't be
    /// registered, or the orchestrator task dies
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<Option<SessionSummary>> {
        let mut events = self.room().subscribe();
        // Packets sent right after the join must reach the event channel
        let mut packets = self.room().subscribe();

        let Some(participant) = self.wait_for_participant(&mut events, shutdown).await? else {
            return Ok(None);
        };
        skip_past_join(&mut packets, &participant);

        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", %id, room = self.room().name());
        let history = self
            .run_session(&participant, events, packets, shutdown.child_token())
            .instrument(span)
            .await?;

        Ok(Some(SessionSummary {
            id,
            participant,
            history,
        }))
    }

    async fn wait_for_participant(
        &self,
        events: &mut broadcast::Receiver<RoomEvent>,
        shutdown: &CancellationToken,
    ) -> Result<Option<String>> {
        tracing::info!(room = self.room().name(), "waiting for a participant");
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => return Ok(None),
                event = events.recv() => event,
            };

            match event {
                Ok(RoomEvent::ParticipantJoined(identity)) if identity != self.room().identity() => {
                    tracing::info!(participant = %identity, "participant joined");
                    return Ok(Some(identity));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(Error::Room("room closed".to_string())),
            }
        }
    }

    async fn run_session(
        &self,
        participant: &str,
        mut events: broadcast::Receiver<RoomEvent>,
        packets: broadcast::Receiver<RoomEvent>,
        token: CancellationToken,
    ) -> Result<History> {
        let timers = Arc::new(TimerService::new());
        let (orchestrator, handle) = Orchestrator::new(self.collaborators.clone(), self.policy.clone());

        let mut tools = ToolRegistry::new();
        BuiltinTools {
            orchestrator: handle.clone(),
            timers: Arc::clone(&timers),
            sampler: Arc::clone(&self.sampler),
            data_dir: self.data_dir.clone(),
        }
        .register(&mut tools)?;

        let orchestrator_task = orchestrator.with_tools(tools).spawn(token.clone());

        let tasks = TaskTracker::new();
        let telemetry = TelemetryBroadcaster::new(
            Arc::clone(&self.sampler),
            Arc::clone(self.room()),
            self.telemetry_interval,
        );
        let telemetry_token = token.child_token();
        tasks.spawn(
            async move {
                let published = telemetry.run(telemetry_token).await;
                tracing::debug!(published, "telemetry stopped");
            }
            .in_current_span(),
        );
        tasks.spawn(
            EventChannel::new(handle.clone())
                .run(packets, token.clone())
                .in_current_span(),
        );
        tasks.close();

        if let Err(e) = handle.start_turn(Trigger::greeting(self.greeting.clone())) {
            tracing::warn!(error = %e, "could not greet participant");
        }

        pump_room_events(&handle, participant, &mut events, &token).await;

        // Teardown
        token.cancel();
        timers.shutdown().await;
        tasks.wait().await;
        orchestrator_task
            .await
            .map_err(|e| Error::Session(format!("orchestrator task failed: {e}")))
    }
}

/// Drop everything up to and including `participant`'s join
fn skip_past_join(packets: &mut broadcast::Receiver<RoomEvent>, participant: &str) {
    loop {
        match packets.try_recv() {
            Ok(RoomEvent::ParticipantJoined(identity)) if identity == participant => return,
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

/// Forward voice activity to the orchestrator until the participant leaves
async fn pump_room_events(
    handle: &OrchestratorHandle,
    participant: &str,
    events: &mut broadcast::Receiver<RoomEvent>,
    token: &CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = token.cancelled() => return,
            event = events.recv() => event,
        };

        let sent = match event {
            Ok(RoomEvent::SpeechStarted) => handle.speech_started(),
            Ok(RoomEvent::UtteranceEnded(clip)) => handle.utterance_ended(clip),
            Ok(RoomEvent::ParticipantLeft(identity)) if identity == participant => {
                tracing::info!(participant = %identity, "participant left");
                return;
            }
            Ok(_) => Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "room event pump lagged");
                Ok(())
            }
            Err(RecvError::Closed) => {
                tracing::warn!("room closed during session");
                return;
            }
        };

        if let Err(e) = sent {
            tracing::warn!(error = %e, "orchestrator is gone, ending session");
            return;
        }
    }
}
