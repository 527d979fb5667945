//! Agent runtime: the intent router and its leaf services.
//!
//! A query moves through a fixed step graph (see `tarifftok_core::flows`):
//! 1. **Classification** (`classifier`, `keyword`) - raw text to intent and entities
//! 2. **Guardrails** (`guardrails`) - confidence floor on the classification
//! 3. **Lookup / summary** - read-only access to the shared `TariffStore`
//! 4. **Narration** (`narrative`) - records or dataset summary to prose
//! 5. **Help** (`help`) - deterministic answers for unsupported or failed runs
//!
//! # Key Types
//!
//! - `AgentRuntime` - step dispatcher with per-leaf timeouts and cancellation
//! - `LlmClient` - pluggable chat-completion backend (OpenAI, Azure OpenAI, Ollama)
//! - `IntentClassifier` / `NarrativeService` - leaf capabilities injected at construction
//!
//! The LLM only classifies and narrates. Rates always come from the dataset.

pub mod aliases;
pub mod classifier;
pub mod guardrails;
pub mod help;
pub mod keyword;
pub mod llm;
pub mod narrative;
pub mod runtime;

pub use classifier::{ClassifierError, IntentClassifier, LlmIntentClassifier};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use keyword::KeywordIntentClassifier;
pub use llm::{build_llm_client, HttpLlmClient, LlmClient, LlmError, LlmRequest, MockLlmClient};
pub use narrative::{
    LlmNarrator, NarrativeError, NarrativeInput, NarrativeRequest, NarrativeService, NarrativeStyle,
    TemplateNarrator,
};
pub use runtime::{AgentRuntime, RouterError, RuntimeSettings};
