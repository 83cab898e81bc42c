use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";
const CLIENT_REQUEST_TOKEN_PREFIX: &str = "vending-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub stack_name: String,
    pub region: String,
    pub template_body: String,
    pub parameters: Vec<StackParameter>,
    pub client_request_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEventRecord {
    pub logical_resource_id: String,
    pub resource_type: String,
    pub resource_status: String,
    pub resource_status_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_id: String,
    pub stack_name: String,
    pub stack_status: String,
    pub stack_status_reason: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTerminal {
    CreateComplete,
    RollbackComplete,
    RollbackFailed,
    DeleteComplete,
}

impl StackTerminal {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "CREATE_COMPLETE" => Some(Self::CreateComplete),
            "ROLLBACK_COMPLETE" => Some(Self::RollbackComplete),
            "ROLLBACK_FAILED" => Some(Self::RollbackFailed),
            "DELETE_COMPLETE" => Some(Self::DeleteComplete),
            _ => None,
        }
    }
}

/// How a submitted baseline stack ended. Only `Completed` lets the
/// provisioning flow continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Completed(StackDescription),
    RolledBack(StackDescription),
    Failed(StackDescription),
}

impl DeploymentOutcome {
    pub fn from_terminal(terminal: StackTerminal, description: StackDescription) -> Self {
        match terminal {
            StackTerminal::CreateComplete => Self::Completed(description),
            StackTerminal::RollbackComplete => Self::RolledBack(description),
            StackTerminal::RollbackFailed | StackTerminal::DeleteComplete => {
                Self::Failed(description)
            }
        }
    }
}

/// Returns the terminal state when `event` is the top-level stack event for
/// `stack_name`. Nested stacks share the resource type, so the logical id is
/// checked as well.
pub fn classify_stack_event(stack_name: &str, event: &StackEventRecord) -> Option<StackTerminal> {
    if event.resource_type != STACK_RESOURCE_TYPE || event.logical_resource_id != stack_name {
        return None;
    }
    StackTerminal::parse(&event.resource_status)
}

/// Idempotency token for `CreateStack`, stable for one CloudFormation
/// request. Tokens must start with a letter and stay under 128 characters.
pub fn client_request_token(request_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{CLIENT_REQUEST_TOKEN_PREFIX}{}", &digest[..32])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(logical_id: &str, resource_type: &str, status: &str) -> StackEventRecord {
        StackEventRecord {
            logical_resource_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            resource_status: status.to_string(),
            resource_status_reason: None,
        }
    }

    fn description(status: &str) -> StackDescription {
        StackDescription {
            stack_id: "arn:aws:cloudformation:eu-west-1:222222222222:stack/baseline/1".to_string(),
            stack_name: "baseline".to_string(),
            stack_status: status.to_string(),
            stack_status_reason: None,
            outputs: BTreeMap::new(),
        }
    }

    #[test]
    fn only_top_level_stack_events_are_terminal() {
        assert_eq!(
            classify_stack_event(
                "baseline",
                &event("baseline", STACK_RESOURCE_TYPE, "CREATE_COMPLETE")
            ),
            Some(StackTerminal::CreateComplete)
        );
        assert_eq!(
            classify_stack_event(
                "baseline",
                &event("NestedNetwork", STACK_RESOURCE_TYPE, "CREATE_COMPLETE")
            ),
            None
        );
        assert_eq!(
            classify_stack_event(
                "baseline",
                &event("baseline", "AWS::EC2::VPC", "CREATE_COMPLETE")
            ),
            None
        );
        assert_eq!(
            classify_stack_event(
                "baseline",
                &event("baseline", STACK_RESOURCE_TYPE, "CREATE_IN_PROGRESS")
            ),
            None
        );
    }

    #[test]
    fn rollback_is_a_named_outcome() {
        let outcome = DeploymentOutcome::from_terminal(
            StackTerminal::RollbackComplete,
            description("ROLLBACK_COMPLETE"),
        );

        assert!(matches!(
            outcome,
            DeploymentOutcome::RolledBack(ref rolled_back)
                if rolled_back.stack_status == "ROLLBACK_COMPLETE"
        ));
        assert!(matches!(
            DeploymentOutcome::from_terminal(
                StackTerminal::RollbackFailed,
                description("ROLLBACK_FAILED")
            ),
            DeploymentOutcome::Failed(_)
        ));
    }

    #[test]
    fn client_request_token_is_stable_and_well_formed() {
        let token = client_request_token("d8b3c5a2-request");

        assert_eq!(token, client_request_token("d8b3c5a2-request"));
        assert_ne!(token, client_request_token("other-request"));
        assert!(token.starts_with("vending-"));
        assert!(token.len() < 128);
        assert!(token
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '-'));
    }
}
