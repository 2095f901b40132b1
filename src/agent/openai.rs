//! OpenAI-compatible chat completions with function calling

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Reasoner, ReasoningRequest, ReasoningResponse};
use crate::conversation::{ConversationMessage, Role, ToolCall};
use crate::{Error, Result};

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl From<ChoiceMessage> for ReasoningResponse {
    fn from(message: ChoiceMessage) -> Self {
        Self {
            text: message.content.unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: parse_arguments(&c.function.arguments),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Reasoner backed by any `/chat/completions` endpoint that speaks the
/// `OpenAI` tool-calling dialect
pub struct OpenAiReasoner {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiReasoner")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiReasoner {
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, base_url: &str, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for reasoning".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn body(&self, request: &ReasoningRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        messages.extend(request.history.iter().map(wire_message));
        if let Some(instruction) = &request.instruction {
            messages.push(json!({ "role": "system", "content": instruction }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }

        body
    }
}

fn wire_message(message: &ConversationMessage) -> Value {
    match message.role() {
        Role::User => json!({ "role": "user", "content": message.content() }),
        Role::Assistant if message.tool_calls().is_empty() => {
            json!({ "role": "assistant", "content": message.content() })
        }
        Role::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls()
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if message.content().is_empty() {
                Value::Null
            } else {
                Value::String(message.content().to_string())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id().unwrap_or_default(),
            "content": message.content(),
        }),
    }
}

/// Arguments arrive as a JSON string; anything unparseable is passed through
/// as a string so schema validation reports it
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse> {
        tracing::debug!(
            model = %self.model,
            messages = request.history.len(),
            tools = request.tools.len(),
            "reasoning request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| Error::Reasoning(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LLM API error");
            return Err(Error::Reasoning(format!("LLM API error {status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Reasoning(format!("invalid LLM response: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.into())
            .ok_or_else(|| Error::Reasoning("LLM returned no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSpec;

    fn reasoner() -> OpenAiReasoner {
        OpenAiReasoner::new(
            SecretString::from("sk-test".to_string()),
            "https://api.openai.com/v1/",
            "gpt-4o".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn body_carries_history_tools_and_instruction() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "set_timer".to_string(),
            arguments: json!({ "seconds": 5 }),
        };
        let request = ReasoningRequest {
            system_prompt: "be brief".to_string(),
            instruction: Some("wave back".to_string()),
            history: vec![
                ConversationMessage::user("timer please"),
                ConversationMessage::assistant_tool_calls("", vec![call]),
                ConversationMessage::tool("call_1", "Timer set for 5 seconds."),
            ],
            tools: vec![ToolSpec {
                name: "set_timer".to_string(),
                description: "Set a timer".to_string(),
                parameters: json!({ "type": "object" }),
            }],
        };

        let body = reasoner().body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], r#"{"seconds":5}"#);
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(messages[4]["content"], "wave back");
        assert_eq!(body["tools"][0]["function"]["name"], "set_timer");
    }

    #[test]
    fn null_tool_calls_is_a_plain_reply() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "Hi.", "tool_calls": null } }]
        }))
        .unwrap();
        let response: ReasoningResponse = chat.choices.into_iter().next().unwrap().message.into();

        assert_eq!(response.text, "Hi.");
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn tool_calls_keep_their_order() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null, "tool_calls": [
                { "id": "a", "function": { "name": "first", "arguments": "{}" } },
                { "id": "b", "function": { "name": "second", "arguments": "{\"x\":1}" } }
            ] } }]
        }))
        .unwrap();
        let response: ReasoningResponse = chat.choices.into_iter().next().unwrap().message.into();

        let names: Vec<_> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(response.tool_calls[1].arguments, json!({ "x": 1 }));
        assert!(response.text.is_empty());
    }

    #[test]
    fn no_tools_key_without_tools() {
        let request = ReasoningRequest {
            system_prompt: String::new(),
            instruction: None,
            history: vec![ConversationMessage::user("hi")],
            tools: Vec::new(),
        };
        assert!(reasoner().body(&request).get("tools").is_none());
    }

    #[test]
    fn unparseable_arguments_pass_through_as_string() {
        assert_eq!(parse_arguments(r#"{"task":"milk"}"#), json!({ "task": "milk" }));
        assert_eq!(parse_arguments(""), Value::Null);
        assert_eq!(parse_arguments("{oops"), Value::String("{oops".to_string()));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        assert_eq!(reasoner().base_url, "https://api.openai.com/v1");
    }
}
