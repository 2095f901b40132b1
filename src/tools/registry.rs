//! Tool registry: maps tool names to handlers and schemas
//!
//! Every failure mode of [`ToolRegistry::invoke`] comes back as a
//! [`ToolError`]; the orchestrator folds it into a tool-result message so the
//! reasoning engine can recover conversationally.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::schema::ToolSchema;
use crate::conversation::{ConversationMessage, ToolCall};
use crate::{Error, Result};

/// Prefix marking a tool-result message as a failure
pub const TOOL_ERROR_PREFIX: &str = "Error: ";

/// Upper bound on a single handler call
const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a tool invocation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{tool} failed: {reason}")]
    Handler { tool: String, reason: String },
}

/// A callable tool
///
/// Handlers must return a prompt acknowledgment. Long-running follow-up work
/// (a timer firing, say) is surfaced later as a new trigger, never as part of
/// this result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<String>;
}

/// Adapter turning an async closure into a [`ToolHandler`]
pub struct FnTool<F>(F);

/// Wrap an async closure as a tool handler
pub fn from_fn<F, Fut>(f: F) -> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    FnTool(f)
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn call(&self, args: Value) -> Result<String> {
        (self.0)(args).await
    }
}

/// Tool definition as advertised to the reasoning engine
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct RegisteredTool {
    name: String,
    schema: ToolSchema,
    handler: Arc<dyn ToolHandler>,
}

/// Per-session set of callable tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under a unique name
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateTool` if the name is already taken
    pub fn register(
        &mut self,
        name: &str,
        handler: impl ToolHandler + 'static,
        schema: ToolSchema,
    ) -> Result<()> {
        if self.contains(name) {
            return Err(Error::DuplicateTool(name.to_string()));
        }

        tracing::debug!(tool = name, "registered tool");
        self.tools.push(RegisteredTool {
            name: name.to_string(),
            schema,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Definitions of every registered tool
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name.clone(),
                description: t.schema.description().to_string(),
                parameters: t.schema.to_json_schema(),
            })
            .collect()
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Validate arguments and run the named tool
    ///
    /// The handler runs on its own task so a panic inside it becomes a
    /// `ToolError::Handler` instead of tearing down the caller.
    ///
    /// # Errors
    ///
    /// `UnknownTool`, `InvalidArguments`, or `Handler` (including timeouts)
    pub async fn invoke(&self, name: &str, arguments: &Value) -> std::result::Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.schema
            .validate(arguments)
            .map_err(|reason| ToolError::InvalidArguments {
                tool: name.to_string(),
                reason,
            })?;

        let handler = Arc::clone(&tool.handler);
        let args = arguments.clone();
        let task = tokio::spawn(async move { handler.call(args).await });

        let handler_error = |reason: String| ToolError::Handler {
            tool: name.to_string(),
            reason,
        };

        match tokio::time::timeout(HANDLER_TIMEOUT, task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(handler_error(e.to_string())),
            Ok(Err(join)) => Err(handler_error(format!("handler panicked: {join}"))),
            Err(_) => Err(handler_error(format!(
                "timed out after {}s",
                HANDLER_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Run a tool call and capture its outcome
    pub async fn resolve(&self, call: &ToolCall) -> ToolInvocation {
        let outcome = self.invoke(&call.name, &call.arguments).await;
        match &outcome {
            Ok(_) => tracing::debug!(tool = %call.name, "tool succeeded"),
            Err(e) => tracing::warn!(tool = %call.name, error = %e, "tool failed"),
        }

        ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome,
        }
    }
}

/// A resolved tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub outcome: std::result::Result<String, ToolError>,
}

impl ToolInvocation {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Tool-result message for the conversation history
    #[must_use]
    pub fn to_message(&self) -> ConversationMessage {
        let content = match &self.outcome {
            Ok(output) => output.clone(),
            Err(e) => format!("{TOOL_ERROR_PREFIX}{e}"),
        };
        ConversationMessage::tool(&self.call_id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ParamKind;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "echo",
                from_fn(|args: Value| async move {
                    Ok::<_, Error>(args["text"].as_str().unwrap_or_default().to_string())
                }),
                ToolSchema::new("Echo text").param("text", ParamKind::String, "Text to echo"),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn invokes_registered_tool() {
        let registry = echo_registry();
        let out = registry.invoke("echo", &json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out, "hi");
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = echo_registry();
        let err = registry
            .register(
                "echo",
                from_fn(|_| async { Ok::<_, Error>(String::new()) }),
                ToolSchema::new("again"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = echo_registry();
        let err = registry.invoke("missing", &json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("missing".to_string()));
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported() {
        let registry = echo_registry();
        let err = registry.invoke("echo", &json!({ "text": 3 })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_are_contained() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "fails",
                from_fn(|_| async { Err::<String, _>(Error::Io(std::io::Error::other("disk full"))) }),
                ToolSchema::new("Always fails"),
            )
            .unwrap();
        registry
            .register(
                "panics",
                from_fn(|_| async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<_, Error>(String::new())
                }),
                ToolSchema::new("Always panics"),
            )
            .unwrap();

        let err = registry.invoke("fails", &Value::Null).await.unwrap_err();
        assert!(matches!(&err, ToolError::Handler { reason, .. } if reason.contains("disk full")));

        let err = registry.invoke("panics", &Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::Handler { .. }));
    }

    #[tokio::test]
    async fn failed_invocation_renders_error_marker() {
        let registry = echo_registry();
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "nope".to_string(),
            arguments: json!({}),
        };
        let invocation = registry.resolve(&call).await;
        assert!(invocation.is_error());

        let msg = invocation.to_message();
        assert!(msg.content().starts_with(TOOL_ERROR_PREFIX));
        assert_eq!(msg.tool_call_id(), Some("call_9"));
    }

    #[test]
    fn specs_follow_registration_order() {
        let mut registry = echo_registry();
        registry
            .register("list", from_fn(|_| async { Ok::<_, Error>(String::new()) }), ToolSchema::new("List"))
            .unwrap();
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["echo", "list"]);
    }
}
