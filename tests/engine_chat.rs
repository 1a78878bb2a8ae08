//! End-to-end engine tests over scripted mock providers.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use rail_sahayak::adapters::{
    InMemoryComplaintStore, MockChatModel, MockFailure, MockResolver, StaticReferenceValidator,
};
use rail_sahayak::config::default_tier_table;
use rail_sahayak::domain::{ConversationMessage, MessageRole, ToolCallRequest};
use rail_sahayak::orchestrator::{ChatRequest, CompletionEngine, EngineError, ToolRouter};
use rail_sahayak::ports::{ComplaintStore, TurnOutcome};

fn engine_over(resolver: MockResolver, store: Arc<InMemoryComplaintStore>) -> CompletionEngine {
    let tools = ToolRouter::new(store, Arc::new(StaticReferenceValidator::new()));
    CompletionEngine::new(Arc::new(resolver), default_tier_table(), tools)
}

#[tokio::test(start_paused = true)]
async fn plain_chat_turn_returns_model_text() {
    let model = MockChatModel::new().reply_text("Your train is on platform 4.");
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let reply = engine
        .chat(
            ChatRequest::new("where does 12951 depart from?"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reply, "Your train is on platform 4.");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn escalatable_failure_falls_through_to_the_next_tier() {
    let primary = MockChatModel::new().fail(MockFailure::Upstream {
        status: 429,
        message: "rate limit exceeded".to_string(),
    });
    let secondary = MockChatModel::new().reply_text("answered by the fallback model");
    let engine = engine_over(
        MockResolver::new()
            .with_model(0, primary.clone())
            .with_model(1, secondary.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let reply = engine
        .chat(ChatRequest::new("hello"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply, "answered by the fallback model");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(secondary.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unclassifiable_failures_exhaust_the_budget() {
    let model = MockChatModel::new()
        .fail(MockFailure::Upstream {
            status: 400,
            message: "something odd".to_string(),
        })
        .fail(MockFailure::Upstream {
            status: 400,
            message: "something odd".to_string(),
        })
        .fail(MockFailure::Upstream {
            status: 400,
            message: "something odd".to_string(),
        });
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let err = engine
        .chat(ChatRequest::new("hello"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Exhausted(_)));
    assert_eq!(model.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_request_makes_no_provider_calls() {
    let model = MockChatModel::new().reply_text("never used");
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .chat(ChatRequest::new("hello"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn structured_tool_round_trip_preserves_correlation_and_order() {
    let call = ToolCallRequest::with_correlation_id(
        "register_complaint",
        json!({"category": "cleanliness", "description": "coach B3 toilets are dirty"}),
        "call_1",
    );
    let model = MockChatModel::new()
        .reply(TurnOutcome {
            text: String::new(),
            tool_calls: vec![call],
        })
        .reply_text("Your complaint is registered. Keep the reference handy.");
    let store = Arc::new(InMemoryComplaintStore::new());
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::clone(&store),
    );

    let reply = engine
        .chat(
            ChatRequest::new("the toilets in coach B3 are filthy"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reply, "Your complaint is registered. Keep the reference handy.");
    assert_eq!(store.complaints().await.unwrap().len(), 1);

    // The result answers the request it was made for.
    let batches = model.tool_result_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].correlation_id, "call_1");
    assert!(batches[0][0].payload["reference"]
        .as_str()
        .unwrap()
        .starts_with("CMP-"));

    // Session history: user, assistant tool-call, tool results, assistant.
    let history = model.recorded_history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, MessageRole::User);
    assert!(history[1].has_tool_calls());
    assert_eq!(history[2].role, MessageRole::Tool);
    assert_eq!(history[3].role, MessageRole::Assistant);
}

#[tokio::test(start_paused = true)]
async fn textual_function_call_is_executed_and_stripped() {
    let model = MockChatModel::new().reply_text(
        "Let me register that for you. \
         FUNCTION_CALL: register_complaint({\"category\": \"food\", \
         \"description\": \"stale food served in pantry car\"}) \
         You will receive updates shortly.",
    );
    let store = Arc::new(InMemoryComplaintStore::new());
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::clone(&store),
    );

    let reply = engine
        .chat(
            ChatRequest::new("the pantry car served stale food"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        reply,
        "Let me register that for you. You will receive updates shortly."
    );
    assert!(!reply.contains("FUNCTION_CALL:"));
    assert_eq!(store.complaints().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bare_textual_function_call_gets_a_reference_narration() {
    let model = MockChatModel::new().reply_text(
        "FUNCTION_CALL: register_complaint({\"category\": \"security\", \
         \"description\": \"unattended bag on platform 2\"})",
    );
    let store = Arc::new(InMemoryComplaintStore::new());
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::clone(&store),
    );

    let reply = engine
        .chat(
            ChatRequest::new("there is an unattended bag on platform 2"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(reply.contains("Reference: CMP-"));
    assert_eq!(store.complaints().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn emergency_preparation_uses_the_provider_and_appends_the_instruction() {
    let model = MockChatModel::new()
        .reply_text("I understand there is a fire in coach S5. Help is being prepared.");
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let reply = engine
        .chat(
            ChatRequest::new("there is a fire in coach S5"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(reply.starts_with("I understand there is a fire in coach S5."));
    assert!(reply.ends_with("Reply CONFIRM to dispatch emergency assistance to your location."));
    // No contact numbers before confirmation.
    assert!(!reply.contains("139"));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn emergency_preparation_survives_total_provider_failure() {
    let failing = || MockFailure::Upstream {
        status: 400,
        message: "something odd".to_string(),
    };
    let model = MockChatModel::new()
        .fail(failing())
        .fail(failing())
        .fail(failing());
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let reply = engine
        .chat(
            ChatRequest::new("madad karo, I am trapped right now"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(reply.contains("Emergency details noted:"));
    assert!(reply.ends_with("Reply CONFIRM to dispatch emergency assistance to your location."));
}

#[tokio::test(start_paused = true)]
async fn confirmed_emergency_short_circuits_without_provider_calls() {
    let model = MockChatModel::new().reply_text("never used");
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let history = vec![
        ConversationMessage::user("there is a fire in coach S5"),
        ConversationMessage::assistant(
            "Emergency details noted: fire in coach S5.\n\n\
             Reply CONFIRM to dispatch emergency assistance to your location.",
        ),
    ];
    let reply = engine
        .chat(
            ChatRequest::new("CONFIRM").with_history(history),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(reply.contains("Emergency contacts:"));
    assert!(reply.contains("Railway Helpline: 139"));
    assert!(reply.contains("Police: 112"));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_stray_confirm_without_preparation_is_a_normal_turn() {
    let model = MockChatModel::new().reply_text("Could you tell me more about your issue?");
    let engine = engine_over(
        MockResolver::new().with_model(0, model.clone()),
        Arc::new(InMemoryComplaintStore::new()),
    );

    let reply = engine
        .chat(ChatRequest::new("ok"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply, "Could you tell me more about your issue?");
    assert_eq!(model.call_count(), 1);
}
