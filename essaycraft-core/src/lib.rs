//! # essaycraft core
//!
//! Building blocks for the essay-writing workflow.
//!
//! ## Core Concepts
//! - **State**: `WorkflowState` threaded through every step, merged from `StateUpdate`s
//! - **Steps**: the fixed state machine (`Step`) and its transition table
//! - **Provider**: trait-based LLM communication (OpenAI-compatible, Anthropic)
//! - **Search**: trait-based web search (Tavily)
//! - **Store**: session-keyed checkpoints with pluggable backends

pub mod error;
pub mod provider;
pub mod search;
pub mod settings;
pub mod state;
pub mod step;
pub mod store;
pub mod structured;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, ConfiguredProvider,
    FinishReason, LlmProvider, OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role,
    ToolCall, ToolChoice, ToolDefinition, Usage,
};
pub use search::{SearchProvider, SearchResult, TavilyProvider};
pub use settings::Settings;
pub use state::{StateUpdate, WorkflowState};
pub use step::Step;
pub use store::{
    Checkpoint, CheckpointStore, FileBackend, MemoryBackend, RunStatus, SqliteBackend,
    StoreBackend,
};
pub use structured::{OutputSchema, Queries};
