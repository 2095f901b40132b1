//! Daemon - the main agent service
//!
//! Opens the agent's room, serves the HTTP control plane and supervises
//! sessions in that room until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::ApiServerBuilder;
use crate::room::{Room, RoomHub};
use crate::session::SessionSupervisor;
use crate::{Config, Error, Result};

/// The ADA daemon
pub struct Daemon {
    config: Config,
    hub: RoomHub,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is unusable
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hub: RoomHub::new(),
        })
    }

    /// Rooms this daemon hosts
    #[must_use]
    pub const fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the daemon encounters a fatal error
    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                signal.cancel();
            }
        });

        self.run_until(shutdown).await
    }

    /// Run until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// Returns error if collaborators can't be built, the API server fails,
    /// or a session fails
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        let room = self
            .hub
            .open(&self.config.room.name, &self.config.room.identity)
            .await;
        let room: Arc<dyn Room> = room;
        let supervisor = SessionSupervisor::from_config(&self.config, Arc::clone(&room))?;

        let server = ApiServerBuilder::new(self.hub.clone(), self.config.room.name.clone())
            .port(self.config.api_server.port)
            .livekit(self.config.livekit.clone())
            .static_dir(self.config.api_server.static_dir.clone())
            .build()
            .spawn(shutdown.clone());

        tracing::info!(
            room = room.name(),
            identity = room.identity(),
            port = self.config.api_server.port,
            "daemon running"
        );

        let sessions = supervisor.serve(shutdown.clone()).await;
        // Whatever ended the sessions also ends the daemon
        shutdown.cancel();

        let served = server
            .await
            .map_err(|e| Error::Session(format!("API server task failed: {e}")))?;

        self.hub.close(&self.config.room.name).await;
        tracing::info!("daemon stopped");
        sessions.and(served)
    }
}
