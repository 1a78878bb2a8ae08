//! Tool routing.
//!
//! Declares the portal's callable functions to the model and dispatches
//! incoming tool calls against the collaborator ports. Execution failures
//! never abort the chat turn; they are encoded into the result payload so
//! the model can explain the problem to the user.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::{ToolCallRequest, ToolDeclaration, ToolResult};
use crate::ports::{ComplaintDraft, ComplaintStore, ReferenceKind, ReferenceValidator};

/// Routes model tool calls to the portal's collaborator ports.
#[derive(Clone)]
pub struct ToolRouter {
    store: Arc<dyn ComplaintStore>,
    validator: Arc<dyn ReferenceValidator>,
}

impl ToolRouter {
    /// Creates a router over the portal's complaint store and reference
    /// validator.
    pub fn new(store: Arc<dyn ComplaintStore>, validator: Arc<dyn ReferenceValidator>) -> Self {
        Self { store, validator }
    }

    /// Tool declarations advertised to every session.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::new(
                "register_complaint",
                "Register a passenger complaint. Use once the category and a description \
                 are known; location, train number, and PNR are optional.",
                json!({
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "description": "Complaint category",
                            "enum": [
                                "cleanliness", "food", "security", "staff",
                                "punctuality", "amenities", "other"
                            ]
                        },
                        "description": {
                            "type": "string",
                            "description": "What happened, in the passenger's words"
                        },
                        "location": {
                            "type": "string",
                            "description": "Coach, platform, or station where it happened"
                        },
                        "train_number": {
                            "type": "string",
                            "description": "Train number if known"
                        },
                        "pnr": {
                            "type": "string",
                            "description": "Passenger PNR if provided"
                        }
                    },
                    "required": ["category", "description"]
                }),
            ),
            ToolDeclaration::new(
                "get_complaints",
                "List the passenger's registered complaints with their references and statuses.",
                json!({
                    "type": "object",
                    "properties": {}
                }),
            ),
            ToolDeclaration::new(
                "validate_reference",
                "Check a station or train against railway reference data and get the \
                 canonical form or close matches.",
                json!({
                    "type": "object",
                    "properties": {
                        "kind": {
                            "type": "string",
                            "enum": ["station", "train"],
                            "description": "What kind of value is being checked"
                        },
                        "value": {
                            "type": "string",
                            "description": "Station name/code or train number/name"
                        }
                    },
                    "required": ["kind", "value"]
                }),
            ),
        ]
    }

    /// Executes one tool call. The returned result always answers the
    /// request; failures are reported in the payload under `"error"`.
    pub async fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        tracing::debug!(tool = %call.name, "executing tool call");
        let payload = match call.name.as_str() {
            "register_complaint" => self.register_complaint(&call.arguments).await,
            "get_complaints" => self.get_complaints().await,
            "validate_reference" => self.validate_reference(&call.arguments).await,
            unknown => {
                tracing::warn!(tool = %unknown, "model requested an undeclared tool");
                json!({ "error": format!("unknown tool: {unknown}") })
            }
        };
        ToolResult::for_call(call, payload)
    }

    async fn register_complaint(&self, arguments: &Value) -> Value {
        let draft: ComplaintDraft = match serde_json::from_value(arguments.clone()) {
            Ok(draft) => draft,
            Err(e) => return json!({ "error": format!("invalid complaint arguments: {e}") }),
        };
        match self.store.add_complaint(draft).await {
            Ok(complaint) => json!({
                "reference": complaint.reference,
                "status": complaint.status,
                "created_at": complaint.created_at.to_rfc3339(),
            }),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    async fn get_complaints(&self) -> Value {
        match self.store.complaints().await {
            Ok(complaints) => {
                let listed: Vec<Value> = complaints
                    .iter()
                    .map(|c| {
                        json!({
                            "reference": c.reference,
                            "category": c.category,
                            "description": c.description,
                            "status": c.status,
                            "created_at": c.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                json!({ "complaints": listed, "count": listed.len() })
            }
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    async fn validate_reference(&self, arguments: &Value) -> Value {
        let kind: ReferenceKind = match arguments
            .get("kind")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
        {
            Ok(Some(kind)) => kind,
            Ok(None) => return json!({ "error": "missing field: kind" }),
            Err(e) => return json!({ "error": format!("invalid kind: {e}") }),
        };
        let Some(value) = arguments.get("value").and_then(Value::as_str) else {
            return json!({ "error": "missing field: value" });
        };
        match self.validator.validate(kind, value).await {
            Ok(outcome) => json!(outcome),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryComplaintStore, StaticReferenceValidator};

    fn router() -> ToolRouter {
        ToolRouter::new(
            Arc::new(InMemoryComplaintStore::new()),
            Arc::new(StaticReferenceValidator::new()),
        )
    }

    #[test]
    fn declares_the_three_portal_tools() {
        let names: Vec<String> = router()
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            vec!["register_complaint", "get_complaints", "validate_reference"]
        );
    }

    #[tokio::test]
    async fn register_complaint_returns_a_reference() {
        let router = router();
        let call = ToolCallRequest::new(
            "register_complaint",
            json!({"category": "cleanliness", "description": "dirty coach B3"}),
        );
        let result = router.execute(&call).await;
        assert_eq!(result.name, "register_complaint");
        assert!(result.payload["reference"]
            .as_str()
            .unwrap()
            .starts_with("CMP-"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_payloads() {
        let router = router();
        let call = ToolCallRequest::new("register_complaint", json!({"category": "cleanliness"}));
        let result = router.execute(&call).await;
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("description"));
    }

    #[tokio::test]
    async fn unknown_tools_are_reported_not_panicked() {
        let router = router();
        let call = ToolCallRequest::new("launch_rocket", json!({}));
        let result = router.execute(&call).await;
        assert_eq!(
            result.payload["error"].as_str().unwrap(),
            "unknown tool: launch_rocket"
        );
    }

    #[tokio::test]
    async fn validate_reference_round_trips_kind_and_value() {
        let router = router();
        let call = ToolCallRequest::new(
            "validate_reference",
            json!({"kind": "station", "value": "NDLS"}),
        );
        let result = router.execute(&call).await;
        assert_eq!(result.payload["valid"], true);
        assert_eq!(result.payload["canonical"], "New Delhi (NDLS)");
    }

    #[tokio::test]
    async fn get_complaints_lists_registered_entries() {
        let router = router();
        let register = ToolCallRequest::new(
            "register_complaint",
            json!({"category": "food", "description": "stale food in pantry car"}),
        );
        router.execute(&register).await;

        let list = ToolCallRequest::new("get_complaints", json!({}));
        let result = router.execute(&list).await;
        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["complaints"][0]["category"], "food");
    }

    #[tokio::test]
    async fn correlation_id_flows_into_the_result() {
        let router = router();
        let call = ToolCallRequest::with_correlation_id("get_complaints", json!({}), "call_7");
        let result = router.execute(&call).await;
        assert_eq!(result.correlation_id, "call_7");
    }
}
