//! Turn model: states, triggers and the per-turn scratch state

use std::fmt;

use crate::conversation::ConversationMessage;

/// Where the orchestrator is in the turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    Listening,
    Transcribing,
    Reasoning,
    ToolExecuting,
    Synthesizing,
    Speaking,
    Interrupted,
}

impl TurnState {
    /// States in which a turn owns in-flight model or output work
    #[must_use]
    pub const fn is_committing(self) -> bool {
        matches!(
            self,
            Self::Reasoning | Self::ToolExecuting | Self::Synthesizing | Self::Speaking
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Reasoning => "reasoning",
            Self::ToolExecuting => "tool_executing",
            Self::Synthesizing => "synthesizing",
            Self::Speaking => "speaking",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// What caused a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// End of a transcribed utterance
    Speech,
    /// Text injected on the chat topic
    Chat,
    /// Gesture code on the gesture topic
    Gesture,
    /// Session greeting
    Greeting,
    /// A timer callback
    Timer,
    /// Spoken notice after a failure outside a turn
    Notice,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Speech => "speech",
            Self::Chat => "chat",
            Self::Gesture => "gesture",
            Self::Greeting => "greeting",
            Self::Timer => "timer",
            Self::Notice => "notice",
        };
        f.write_str(s)
    }
}

/// Payload a trigger carries into its turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// Recorded in history as a user message, then reasoned over
    User(String),
    /// Directs the next reply without being recorded in history
    Instruction(String),
    /// Spoken as-is, skipping reasoning
    Say(String),
}

/// A request to start a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    kind: TriggerKind,
    input: TurnInput,
    interruptible: bool,
}

impl Trigger {
    #[must_use]
    pub const fn new(kind: TriggerKind, input: TurnInput) -> Self {
        Self {
            kind,
            input,
            interruptible: true,
        }
    }

    #[must_use]
    pub fn speech(transcript: impl Into<String>) -> Self {
        Self::new(TriggerKind::Speech, TurnInput::User(transcript.into()))
    }

    #[must_use]
    pub fn chat(message: impl Into<String>) -> Self {
        Self::new(TriggerKind::Chat, TurnInput::User(message.into()))
    }

    #[must_use]
    pub fn gesture(instruction: impl Into<String>) -> Self {
        Self::new(TriggerKind::Gesture, TurnInput::Instruction(instruction.into()))
    }

    #[must_use]
    pub fn greeting(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::Greeting, TurnInput::Say(text.into()))
    }

    #[must_use]
    pub fn timer(announcement: impl Into<String>) -> Self {
        Self::new(TriggerKind::Timer, TurnInput::Say(announcement.into()))
    }

    #[must_use]
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::Notice, TurnInput::Say(text.into()))
    }

    /// Reject other triggers and barge-in until this turn finishes
    ///
    /// Only an explicit interrupt cancels a non-interruptible turn.
    #[must_use]
    pub const fn non_interruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        self.kind
    }

    #[must_use]
    pub const fn input(&self) -> &TurnInput {
        &self.input
    }

    #[must_use]
    pub const fn is_interruptible(&self) -> bool {
        self.interruptible
    }
}

/// The turn currently owning the conversation
#[derive(Debug)]
pub(crate) struct Turn {
    pub generation: u64,
    pub trigger: Trigger,
    /// Tool-call rounds completed
    pub rounds: u32,
    /// Consecutive collaborator failures at the current step
    pub failures: u32,
    /// Text of the most recent reasoning round, used if the round cap hits
    pub last_text: String,
    /// Text being synthesized or spoken
    pub reply: String,
    /// Set once the turn has fallen back to the apology
    pub apologizing: bool,
}

impl Turn {
    pub const fn new(generation: u64, trigger: Trigger) -> Self {
        Self {
            generation,
            trigger,
            rounds: 0,
            failures: 0,
            last_text: String::new(),
            reply: String::new(),
            apologizing: false,
        }
    }

    pub fn instruction(&self) -> Option<String> {
        match &self.trigger.input {
            TurnInput::Instruction(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Message recorded once the reply has been spoken in full
    pub fn spoken_message(&self) -> ConversationMessage {
        ConversationMessage::assistant(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committing_states() {
        assert!(TurnState::Reasoning.is_committing());
        assert!(TurnState::ToolExecuting.is_committing());
        assert!(TurnState::Speaking.is_committing());
        assert!(!TurnState::Idle.is_committing());
        assert!(!TurnState::Listening.is_committing());
        assert!(!TurnState::Transcribing.is_committing());
    }

    #[test]
    fn triggers_default_to_interruptible() {
        let trigger = Trigger::greeting("Hello Sir.");
        assert!(trigger.is_interruptible());
        assert_eq!(trigger.kind(), TriggerKind::Greeting);
        assert!(!trigger.non_interruptible().is_interruptible());
    }

    #[test]
    fn only_gestures_carry_instructions() {
        let turn = Turn::new(1, Trigger::gesture("wave back"));
        assert_eq!(turn.instruction().as_deref(), Some("wave back"));

        let turn = Turn::new(2, Trigger::chat("hello"));
        assert!(turn.instruction().is_none());
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(TurnState::ToolExecuting.to_string(), "tool_executing");
        assert_eq!(TriggerKind::Timer.to_string(), "timer");
    }
}
