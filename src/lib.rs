//! ADA - voice assistant agent
//!
//! This library provides the core of the ADA agent:
//! - Turn orchestration with interruption and barge-in
//! - A tool registry and the built-in tools
//! - Timers, telemetry and out-of-band room events
//! - An HTTP control plane for tokens and chat injection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                       Room                           │
//! │   audio  │  chat_message  │  gesture  │ system_stats │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Session Supervisor                    │
//! │  Orchestrator │ Events │ Telemetry │ Timers │ Tools  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Providers                          │
//! │          STT  │  LLM  │  TTS                         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod room;
pub mod session;
pub mod telemetry;
pub mod timer;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use conversation::{ConversationMessage, History, Role, ToolCall};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorHandle, Trigger, TurnState};
pub use session::SessionSupervisor;
