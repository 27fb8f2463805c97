//! Control messages sent from consumer to server.

use serde::{Deserialize, Serialize};

/// Client → server control message.
///
/// `execute_workflow` starts a run; `cancel_workflow` addresses a running
/// one by its `run_id` (events alone cannot disambiguate concurrent runs,
/// so cancellation must name its target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    ExecuteWorkflow {
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    CancelWorkflow {
        run_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_round_trips_with_exact_action_name() {
        let msg = ControlMessage::ExecuteWorkflow {
            input: "find my config file".to_string(),
            model: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["action"], "execute_workflow");
        assert_eq!(json["input"], "find my config file");
        assert!(json.get("model").is_none());

        let parsed: ControlMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn cancel_carries_run_id() {
        let parsed: ControlMessage =
            serde_json::from_str(r#"{"action":"cancel_workflow","run_id":"abc123"}"#).unwrap();
        assert_eq!(
            parsed,
            ControlMessage::CancelWorkflow {
                run_id: "abc123".to_string()
            }
        );
    }

    #[test]
    fn model_override_is_optional() {
        let parsed: ControlMessage =
            serde_json::from_str(r#"{"action":"execute_workflow","input":"hi","model":"coder:14b"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            ControlMessage::ExecuteWorkflow {
                input: "hi".to_string(),
                model: Some("coder:14b".to_string()),
            }
        );
    }
}
