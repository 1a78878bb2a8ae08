//! Mock chat model for tests and local development.
//!
//! Replies come from a scripted queue; every user turn and tool-result batch
//! is recorded for later inspection. State is behind `Arc<Mutex<_>>` so a
//! test keeps its handle while the engine consumes sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::TierConfig;
use crate::domain::{ConversationMessage, ToolResult};
use crate::ports::{
    ChatModel, ChatSession, ModelError, ModelInfo, ModelResolver, ResolveError, SessionParams,
    TurnOutcome, UserTurn,
};

/// One scripted step.
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Return this outcome.
    Reply(TurnOutcome),
    /// Fail with this error.
    Fail(MockFailure),
}

/// Cloneable stand-in for [`ModelError`], converted at the point of use.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Provider-style HTTP failure.
    Upstream { status: u16, message: String },
    /// Transport failure.
    Network(String),
    /// Timeout.
    Timeout,
    /// Cancellation observed mid-call.
    Cancelled,
}

impl From<MockFailure> for ModelError {
    fn from(failure: MockFailure) -> Self {
        match failure {
            MockFailure::Upstream { status, message } => ModelError::upstream(status, message),
            MockFailure::Network(msg) => ModelError::network(msg),
            MockFailure::Timeout => ModelError::Timeout { timeout_secs: 30 },
            MockFailure::Cancelled => ModelError::Cancelled,
        }
    }
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockTurn>,
    sent_turns: Vec<UserTurn>,
    tool_result_batches: Vec<Vec<ToolResult>>,
    session_params: Vec<SessionParams>,
    history_log: Vec<ConversationMessage>,
}

/// Scripted [`ChatModel`] test double.
#[derive(Clone, Default)]
pub struct MockChatModel {
    state: Arc<Mutex<MockState>>,
}

impl MockChatModel {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plain-text reply.
    pub fn reply_text(self, text: impl Into<String>) -> Self {
        self.push(MockTurn::Reply(TurnOutcome::text(text)))
    }

    /// Queues an arbitrary outcome (tool calls included).
    pub fn reply(self, outcome: TurnOutcome) -> Self {
        self.push(MockTurn::Reply(outcome))
    }

    /// Queues a failure.
    pub fn fail(self, failure: MockFailure) -> Self {
        self.push(MockTurn::Fail(failure))
    }

    fn push(self, turn: MockTurn) -> Self {
        self.state.lock().unwrap().script.push_back(turn);
        self
    }

    /// User turns sent across all sessions, in order.
    pub fn sent_turns(&self) -> Vec<UserTurn> {
        self.state.lock().unwrap().sent_turns.clone()
    }

    /// Number of provider calls made (sends plus tool-result continuations).
    pub fn call_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.sent_turns.len() + state.tool_result_batches.len()
    }

    /// Tool-result batches received, in order.
    pub fn tool_result_batches(&self) -> Vec<Vec<ToolResult>> {
        self.state.lock().unwrap().tool_result_batches.clone()
    }

    /// Session parameters captured at each `open_session`.
    pub fn session_params(&self) -> Vec<SessionParams> {
        self.state.lock().unwrap().session_params.clone()
    }

    /// Mirror of every history entry appended by any session, in append
    /// order.
    pub fn recorded_history(&self) -> Vec<ConversationMessage> {
        self.state.lock().unwrap().history_log.clone()
    }
}

impl ChatModel for MockChatModel {
    fn open_session(&self, params: SessionParams) -> Box<dyn ChatSession> {
        let mut state = self.state.lock().unwrap();
        state.session_params.push(params.clone());
        drop(state);
        Box::new(MockSession {
            state: Arc::clone(&self.state),
            history: params.history,
            has_pending_calls: false,
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("mock", "mock-model")
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
    history: Vec<ConversationMessage>,
    has_pending_calls: bool,
}

impl MockSession {
    fn next_step(&self) -> MockTurn {
        let mut state = self.state.lock().unwrap();
        state
            .script
            .pop_front()
            .unwrap_or_else(|| MockTurn::Reply(TurnOutcome::text("(script exhausted)")))
    }

    fn append(&mut self, entry: ConversationMessage) {
        self.state
            .lock()
            .unwrap()
            .history_log
            .push(entry.clone());
        self.history.push(entry);
    }

    fn record_assistant(&mut self, outcome: &TurnOutcome) {
        if outcome.has_tool_calls() {
            self.append(ConversationMessage::assistant_tool_calls(
                outcome.text.clone(),
                outcome.tool_calls.clone(),
            ));
        } else {
            self.append(ConversationMessage::assistant(outcome.text.clone()));
        }
        self.has_pending_calls = outcome.has_tool_calls();
    }
}

#[async_trait]
impl ChatSession for MockSession {
    async fn send(
        &mut self,
        turn: UserTurn,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        self.state.lock().unwrap().sent_turns.push(turn.clone());

        match self.next_step() {
            MockTurn::Reply(outcome) => {
                self.append(ConversationMessage::user_with_attachments(
                    turn.text,
                    turn.attachments,
                ));
                self.record_assistant(&outcome);
                Ok(outcome)
            }
            MockTurn::Fail(failure) => Err(failure.into()),
        }
    }

    async fn send_tool_results(
        &mut self,
        results: Vec<ToolResult>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        if !self.has_pending_calls {
            return Err(ModelError::session_state(
                "send_tool_results called without pending tool calls",
            ));
        }
        self.state
            .lock()
            .unwrap()
            .tool_result_batches
            .push(results.clone());

        match self.next_step() {
            MockTurn::Reply(outcome) => {
                self.append(ConversationMessage::tool_results(results));
                self.record_assistant(&outcome);
                Ok(outcome)
            }
            MockTurn::Fail(failure) => Err(failure.into()),
        }
    }

    fn history(&self) -> &[ConversationMessage] {
        &self.history
    }
}

/// Tier-indexed [`ModelResolver`] over mock models.
#[derive(Clone, Default)]
pub struct MockResolver {
    models: HashMap<u8, Arc<MockChatModel>>,
}

impl MockResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a tier ordinal to a mock model.
    pub fn with_model(mut self, tier: u8, model: MockChatModel) -> Self {
        self.models.insert(tier, Arc::new(model));
        self
    }
}

impl ModelResolver for MockResolver {
    fn resolve(&self, tier: &TierConfig) -> Result<Arc<dyn ChatModel>, ResolveError> {
        self.models
            .get(&tier.tier)
            .map(|m| Arc::clone(m) as Arc<dyn ChatModel>)
            .ok_or_else(|| ResolveError::MissingCredential {
                provider: tier.provider.as_str().to_string(),
            })
    }
}
