//! Orchestrator - failure classification, tiered fallback, tool routing,
//! and the completion engine that ties them together.

mod engine;
mod failure;
mod fallback;
mod router;

pub use engine::{ChatRequest, CompletionEngine, EngineError, DEFAULT_SYSTEM_PROMPT};
pub use failure::FailureKind;
pub use fallback::{FallbackError, FallbackPolicy, TieredFallback};
pub use router::ToolRouter;
