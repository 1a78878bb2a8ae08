//! Adapters - implementations of the engine's ports.
//!
//! ## Available adapters
//!
//! - `GeminiModel` - Google Gemini native dialect (tier 0)
//! - `GatewayModel` - OpenAI-compatible REST gateway (fallback tiers)
//! - `ModelRegistry` - per-credential adapter factory with a client cache
//! - `MockChatModel` - configurable test double with call recording
//! - `InMemoryComplaintStore` / `StaticReferenceValidator` - collaborator
//!   stand-ins for tests and local development

mod gemini;
mod in_memory;
mod mock;
mod openai_compat;
mod registry;

pub use gemini::{GeminiConfig, GeminiModel};
pub use in_memory::{InMemoryComplaintStore, StaticReferenceValidator};
pub use mock::{MockChatModel, MockFailure, MockResolver, MockTurn};
pub use openai_compat::{GatewayConfig, GatewayModel};
pub use registry::ModelRegistry;

use tokio_util::sync::CancellationToken;

use crate::ports::ModelError;

/// Sends a provider request, racing it against the caller's cancellation
/// token. Transport failures map onto [`ModelError`]; HTTP error statuses are
/// handled separately so their bodies stay available for classification.
pub(crate) async fn execute_cancellable(
    request: reqwest::RequestBuilder,
    timeout_secs: u32,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, ModelError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ModelError::Cancelled),
        result = request.send() => result.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout { timeout_secs }
            } else if e.is_connect() {
                ModelError::network(format!("Connection failed: {e}"))
            } else {
                ModelError::network(e.to_string())
            }
        }),
    }
}

/// Turns a non-success response into an upstream error carrying the status
/// and body, which is what the failure classifier works from.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::upstream(status.as_u16(), body))
}
