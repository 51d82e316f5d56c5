//! Anthropic Messages API.
//!
//! The system prompt is a top-level field rather than a message, and forced
//! tool calls come back as `tool_use` content blocks.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = http_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1")
            .trim_end_matches('/')
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::AuthenticationFailed)?;
        let model = request.model.as_deref().unwrap_or(self.default_model());
        let body = MessagesRequest::build(model, &request);
        tracing::debug!(model, messages = body.messages.len(), "anthropic completion");

        let http = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let reply: MessagesResponse = send_checked(http)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(reply.into_completion())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

impl<'a> MessagesRequest<'a> {
    fn build(model: &'a str, request: &'a CompletionRequest) -> Self {
        let mut system: Vec<&str> = Vec::new();
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => system.push(&msg.content),
                Role::User => messages.push(WireMessage { role: "user", content: &msg.content }),
                Role::Assistant => messages.push(WireMessage { role: "assistant", content: &msg.content }),
            }
        }

        let tools = request
            .tools
            .iter()
            .flatten()
            .map(|tool| WireTool {
                name: &tool.name,
                description: &tool.description,
                input_schema: &tool.parameters,
            })
            .collect();

        let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => serde_json::json!({ "type": "auto" }),
            ToolChoice::None => serde_json::json!({ "type": "none" }),
            ToolChoice::Required => serde_json::json!({ "type": "any" }),
            ToolChoice::Function { name } => serde_json::json!({ "type": "tool", "name": name }),
        });

        Self {
            model,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            temperature: request.temperature,
            tools,
            tool_choice,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    model: String,
    content: Vec<Block>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    // thinking and anything newer
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: usize,
    output_tokens: usize,
}

impl MessagesResponse {
    fn into_completion(self) -> CompletionResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                Block::Text { text: part } => text.push_str(&part),
                Block::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                Block::Other => {}
            }
        }

        let finish_reason = match self.stop_reason.as_deref() {
            Some("end_turn" | "stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolCalls,
            Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        };

        CompletionResponse {
            id: self.id,
            model: self.model,
            content: (!text.is_empty()).then_some(text),
            tool_calls,
            finish_reason,
            usage: Usage {
                prompt_tokens: self.usage.input_tokens,
                completion_tokens: self.usage.output_tokens,
                total_tokens: self.usage.input_tokens + self.usage.output_tokens,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::Queries;

    #[test]
    fn test_system_prompt_is_lifted_out() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are an essay grader"),
            ChatMessage::user("essay"),
        ])
        .with_tools(vec![Queries::schema().as_tool()])
        .with_tool_choice(ToolChoice::Function { name: "queries".into() });

        let json = serde_json::to_value(MessagesRequest::build("claude", &request)).unwrap();
        assert_eq!(json["system"], "You are an essay grader");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["tools"][0]["input_schema"]["required"][0], "queries");
        assert_eq!(json["tool_choice"]["type"], "tool");
        assert_eq!(json["tool_choice"]["name"], "queries");
    }

    #[test]
    fn test_without_system_or_tools() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(MessagesRequest::build("claude", &request)).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_tool_use_response_becomes_tool_call() {
        let body = serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "Searching." },
                { "type": "tool_use", "id": "toolu_1", "name": "queries", "input": { "queries": ["a", "b"] } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 8 }
        });

        let reply: MessagesResponse = serde_json::from_value(body).unwrap();
        let completion = reply.into_completion();

        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(completion.content.as_deref(), Some("Searching."));
        assert_eq!(completion.tool_calls[0].name, "queries");
        assert_eq!(completion.usage.total_tokens, 20);

        let args: Queries = completion.tool_calls[0].parse_arguments().unwrap();
        assert_eq!(args.queries, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_sending() {
        let mut config = ProviderConfig::anthropic("");
        config.base_url = Some("http://127.0.0.1:9".into());
        let provider = AnthropicProvider::new(config).unwrap();
        let err = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed));
    }
}
