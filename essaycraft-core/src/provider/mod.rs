//! Model endpoints.
//!
//! Every step of a run talks to a chat-completion endpoint through
//! [`LlmProvider`]. Two wire formats are supported: OpenAI-compatible chat
//! completions (OpenAI, Gemini's compatibility endpoint, local servers) and
//! the Anthropic Messages API. Structured answers are obtained by forcing a
//! single tool call and deserializing its arguments.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use crate::structured::{extract_json, OutputSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt message; steps send a system message and at most one user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Function offered to the model, parameters as JSON Schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Function call returned by the model; `arguments` is raw JSON text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the provider's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Default::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force a call to the named tool
    Function { name: String },
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Failure talking to a model or search endpoint
#[derive(Debug)]
pub enum ProviderError {
    /// Could not reach the endpoint
    Network(String),
    /// Non-success HTTP status
    Api { status: u16, message: String },
    /// Response body was not what the wire format promised
    Parse(String),
    /// HTTP 429; seconds from `Retry-After` when present
    RateLimited { retry_after: Option<u64> },
    InvalidRequest(String),
    /// Missing key, or HTTP 401/403
    AuthenticationFailed,
    /// The model answered without text
    EmptyResponse,
    /// Structured output did not match the requested schema
    Schema(String),
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network: {}", e),
            Self::Api { status, message } => write!(f, "HTTP {}: {}", status, message),
            Self::Parse(e) => write!(f, "unreadable response: {}", e),
            Self::RateLimited { retry_after: Some(secs) } => write!(f, "rate limited, retry after {}s", secs),
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::InvalidRequest(e) => write!(f, "invalid request: {}", e),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::EmptyResponse => write!(f, "empty response"),
            Self::Schema(e) => write!(f, "schema validation failed: {}", e),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Send `request` and turn HTTP failures into `ProviderError`s
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            Err(ProviderError::RateLimited { retry_after })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed),
        code => Err(ProviderError::Api {
            status: code,
            message: response.text().await.unwrap_or_default(),
        }),
    }
}

/// A chat-completion endpoint
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Wire format name, "openai" or "anthropic"
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Completion that must produce text; blank answers are an error
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let response = self.complete(request).await?;
        response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    /// Completion constrained to `schema`.
    ///
    /// The schema is offered as the only tool and the model is forced to call it.
    /// Models that answer in plain text instead are accepted when the text holds
    /// a JSON object (optionally fenced). Anything that does not deserialize into
    /// `T` is a `ProviderError::Schema`.
    async fn complete_structured<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<T, ProviderError> {
        let request = request
            .with_tools(vec![schema.as_tool()])
            .with_tool_choice(ToolChoice::Function { name: schema.name.clone() });
        let response = self.complete(request).await?;

        if let Some(call) = response.tool_calls.iter().find(|c| c.name == schema.name) {
            return call.parse_arguments().map_err(|e| {
                ProviderError::Schema(format!("{} arguments: {}", schema.name, e))
            });
        }

        let content = response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Schema(format!("no '{}' tool call and no text in response", schema.name))
            })?;

        serde_json::from_str(extract_json(&content))
            .map_err(|e| ProviderError::Schema(format!("{} text: {}", schema.name, e)))
    }
}

/// Endpoint, credentials and model for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    /// Google Gemini through its OpenAI-compatible endpoint
    Gemini,
    /// Any OpenAI-compatible server, key optional (vLLM, Ollama, ...)
    Local,
}

impl ProviderType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl ProviderConfig {
    fn hosted(provider_type: ProviderType, api_key: String, base_url: &str, model: &str) -> Self {
        Self {
            provider_type,
            api_key: Some(api_key),
            base_url: Some(base_url.to_string()),
            default_model: Some(model.to_string()),
            timeout_secs: Some(120),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::hosted(ProviderType::OpenAI, api_key.into(), "https://api.openai.com/v1", "gpt-4o")
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::hosted(
            ProviderType::Anthropic,
            api_key.into(),
            "https://api.anthropic.com/v1",
            "claude-sonnet-4-20250514",
        )
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::hosted(
            ProviderType::Gemini,
            api_key.into(),
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.5-flash",
        )
    }

    /// Local servers can be slow on long drafts, hence the longer timeout
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            timeout_secs: Some(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs.unwrap_or(120)))
        .build()
        .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {}", e)))
}

/// A provider chosen from configuration at runtime
pub enum ConfiguredProvider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl ConfiguredProvider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        match config.provider_type {
            ProviderType::Anthropic => Ok(Self::Anthropic(AnthropicProvider::new(config)?)),
            ProviderType::OpenAI | ProviderType::Gemini | ProviderType::Local => {
                Ok(Self::OpenAI(OpenAIProvider::new(config)?))
            }
        }
    }
}

impl LlmProvider for ConfiguredProvider {
    fn name(&self) -> &str {
        match self {
            Self::OpenAI(p) => p.name(),
            Self::Anthropic(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Self::OpenAI(p) => p.default_model(),
            Self::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        match self {
            Self::OpenAI(p) => p.complete(request).await,
            Self::Anthropic(p) => p.complete(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::Queries;

    /// Replays a fixed response and records the last request
    struct CannedProvider {
        response: CompletionResponse,
        last_request: std::sync::Mutex<Option<CompletionRequest>>,
    }

    impl CannedProvider {
        fn new(content: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
            Self {
                response: CompletionResponse {
                    id: "resp-1".into(),
                    model: "canned".into(),
                    content: content.map(String::from),
                    tool_calls,
                    finish_reason: FinishReason::Stop,
                    usage: Usage::default(),
                },
                last_request: std::sync::Mutex::new(None),
            }
        }
    }

    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn default_model(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            *self.last_request.lock().unwrap() = Some(request);
            Ok(self.response.clone())
        }
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are an essay grader"),
            ChatMessage::user("essay"),
        ])
        .with_model("gemini-2.5-flash")
        .with_temperature(0.0);

        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "essay");
        assert_eq!(request.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.tools.is_none() && request.max_tokens.is_none());
    }

    #[test]
    fn test_rate_limit_display() {
        let err = ProviderError::RateLimited { retry_after: Some(7) };
        assert_eq!(err.to_string(), "rate limited, retry after 7s");
        assert_eq!(ProviderError::RateLimited { retry_after: None }.to_string(), "rate limited");
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::gemini("g-key");
        assert_eq!(config.provider_type, ProviderType::Gemini);
        assert_eq!(config.default_model, Some("gemini-2.5-flash".into()));

        let config = ProviderConfig::anthropic("sk-ant-test");
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert_eq!(config.timeout_secs, Some(120));
        assert_eq!(ProviderConfig::local("http://localhost:8000/v1", "m").timeout_secs, Some(300));

        assert_eq!(ProviderType::parse(" Claude "), Some(ProviderType::Anthropic));
        assert_eq!(ProviderType::parse("bard"), None);
    }

    #[test]
    fn test_configured_provider_dispatch() {
        let provider = ConfiguredProvider::from_config(ProviderConfig::gemini("k")).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gemini-2.5-flash");

        let provider = ConfiguredProvider::from_config(ProviderConfig::anthropic("k")).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[tokio::test]
    async fn test_complete_text_rejects_blank() {
        let provider = CannedProvider::new(Some("   "), vec![]);
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let err = provider.complete_text(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_structured_from_tool_call() {
        let provider = CannedProvider::new(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: "queries".into(),
                arguments: r#"{"queries": ["rust ownership", "borrow checker"]}"#.into(),
            }],
        );

        let request = CompletionRequest::new(vec![ChatMessage::user("topic")]);
        let queries: Queries = provider
            .complete_structured(request, &Queries::schema())
            .await
            .unwrap();
        assert_eq!(queries.queries, vec!["rust ownership", "borrow checker"]);

        let sent = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.tools.as_ref().map(|t| t.len()), Some(1));
        assert!(matches!(sent.tool_choice, Some(ToolChoice::Function { ref name }) if name == "queries"));
    }

    #[tokio::test]
    async fn test_structured_from_fenced_text() {
        let provider = CannedProvider::new(
            Some("Sure:\n```json\n{\"queries\": [\"a\"]}\n```"),
            vec![],
        );
        let request = CompletionRequest::new(vec![ChatMessage::user("topic")]);
        let queries: Queries = provider
            .complete_structured(request, &Queries::schema())
            .await
            .unwrap();
        assert_eq!(queries.queries, vec!["a"]);
    }

    #[tokio::test]
    async fn test_structured_schema_mismatch() {
        let provider = CannedProvider::new(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: "queries".into(),
                arguments: r#"{"queries": "not a list"}"#.into(),
            }],
        );
        let request = CompletionRequest::new(vec![ChatMessage::user("topic")]);
        let err = provider
            .complete_structured::<Queries>(request, &Queries::schema())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Schema(_)));

        let provider = CannedProvider::new(None, vec![]);
        let request = CompletionRequest::new(vec![ChatMessage::user("topic")]);
        let err = provider
            .complete_structured::<Queries>(request, &Queries::schema())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Schema(_)));
    }
}
