//! Reasoning collaborator
//!
//! One call per reasoning round: the full history plus the available tool
//! definitions go in, free text or a batch of tool-call requests comes out.

mod openai;

use async_trait::async_trait;

pub use openai::OpenAiReasoner;

use crate::Result;
use crate::conversation::{ConversationMessage, ToolCall};
use crate::tools::ToolSpec;

/// Persona used when no system prompt is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ADA, a helpful voice assistant. \
Your replies are spoken aloud, so keep them short and conversational and avoid \
markdown, lists and emoji. Use the available tools when they help. Address the \
user as Sir.";

/// Input to one reasoning round
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    /// Transient direction for this turn only, never stored in history
    pub instruction: Option<String>,
    pub history: Vec<ConversationMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Output of one reasoning round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningResponse {
    pub text: String,
    /// Requested calls, in the order they should run
    pub tool_calls: Vec<ToolCall>,
}

impl ReasoningResponse {
    /// A plain text answer
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A batch of tool calls
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
        }
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A language model able to answer or request tools
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse>;
}
