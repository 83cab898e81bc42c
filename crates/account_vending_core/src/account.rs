use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCOUNT_ROLE: &str = "AWSCloudFormationStackSetExecutionRole";
pub const ROLE_ARN_PREFIX: &str = "arn:aws:iam::";
pub const ROLE_SESSION_NAME: &str = "AccountVendingBaseline";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccountRequest {
    pub email: String,
    pub account_name: String,
    pub role_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCreationState {
    InProgress,
    Succeeded,
    Failed,
    Unknown(String),
}

impl AccountCreationState {
    pub fn parse(value: &str) -> Self {
        match value {
            "IN_PROGRESS" => Self::InProgress,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Unknown(value) => value,
        }
    }

    /// Unrecognised states are treated as still running.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Snapshot of an Organizations `CreateAccountStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountStatus {
    pub request_id: String,
    pub state: AccountCreationState,
    pub account_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl CreateAccountStatus {
    pub fn resolved_account_id(&self) -> Option<&str> {
        self.account_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub id: String,
    pub name: String,
}

pub fn member_role_arn(account_id: &str, role_name: &str) -> String {
    format!("{ROLE_ARN_PREFIX}{account_id}:role/{role_name}")
}

pub fn console_login_url(account_id: &str) -> String {
    format!("https://{account_id}.signin.aws.amazon.com/console")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_unknown_states() {
        assert_eq!(
            AccountCreationState::parse("IN_PROGRESS"),
            AccountCreationState::InProgress
        );
        assert!(AccountCreationState::parse("SUCCEEDED").is_terminal());
        assert!(AccountCreationState::parse("FAILED").is_terminal());

        let unknown = AccountCreationState::parse("PENDING_REVIEW");
        assert!(!unknown.is_terminal());
        assert_eq!(unknown.as_str(), "PENDING_REVIEW");
    }

    #[test]
    fn blank_account_id_is_unresolved() {
        let mut status = CreateAccountStatus {
            request_id: "car-1".to_string(),
            state: AccountCreationState::Succeeded,
            account_id: Some("  ".to_string()),
            failure_reason: None,
        };
        assert_eq!(status.resolved_account_id(), None);

        status.account_id = Some("222222222222".to_string());
        assert_eq!(status.resolved_account_id(), Some("222222222222"));
    }

    #[test]
    fn builds_role_arn_and_login_url() {
        assert_eq!(
            member_role_arn("222222222222", DEFAULT_ACCOUNT_ROLE),
            "arn:aws:iam::222222222222:role/AWSCloudFormationStackSetExecutionRole"
        );
        assert_eq!(
            console_login_url("222222222222"),
            "https://222222222222.signin.aws.amazon.com/console"
        );
    }
}
