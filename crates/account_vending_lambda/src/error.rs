use account_vending_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    AccessDenied,
    Throttled,
    Unavailable,
    NotFound,
    Other,
}

impl ProviderErrorKind {
    /// Maps an AWS error code onto the retry taxonomy. Access errors are
    /// transient because IAM changes in a new account take time to
    /// propagate.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(
                "AccessDenied" | "AccessDeniedException" | "InvalidClientTokenId"
                | "UnrecognizedClientException" | "AuthFailure",
            ) => Self::AccessDenied,
            Some(
                "Throttling" | "ThrottlingException" | "TooManyRequestsException"
                | "RequestLimitExceeded" | "ConcurrentModificationException",
            ) => Self::Throttled,
            Some("ServiceException" | "InternalFailure" | "ServiceUnavailable") => {
                Self::Unavailable
            }
            Some(code) if code.ends_with("NotFound") || code.ends_with("NotFoundException") => {
                Self::NotFound
            }
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::AccessDenied
                | ProviderErrorKind::Throttled
                | ProviderErrorKind::Unavailable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Account creation failed: {reason}")]
    AccountCreationFailed { reason: String },

    #[error("Stack {stack_name} rolled back: {reason}")]
    DeploymentRolledBack { stack_name: String, reason: String },

    #[error("Stack {stack_name} ended in {status}: {reason}")]
    DeploymentFailed {
        stack_name: String,
        status: String,
        reason: String,
    },

    #[error("{operation} still failing after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last_error: ProviderError,
    },

    #[error("{operation} did not reach a terminal state after {polls} polls")]
    PollTimedOut { operation: &'static str, polls: u32 },

    #[error("template error: {0}")]
    Template(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_propagation_and_throttling_codes_as_transient() {
        for code in ["AccessDenied", "InvalidClientTokenId", "Throttling"] {
            let error = ProviderError::new(ProviderErrorKind::from_code(Some(code)), code);
            assert!(error.is_transient(), "{code} should be transient");
        }
    }

    #[test]
    fn classifies_unknown_and_missing_codes_as_permanent() {
        assert_eq!(
            ProviderErrorKind::from_code(Some("ValidationError")),
            ProviderErrorKind::Other
        );
        assert_eq!(ProviderErrorKind::from_code(None), ProviderErrorKind::Other);
        assert_eq!(
            ProviderErrorKind::from_code(Some("ParentNotFoundException")),
            ProviderErrorKind::NotFound
        );
        assert!(!ProviderError::other("boom").is_transient());
    }

    #[test]
    fn provisioning_errors_render_operator_messages() {
        let error = ProvisioningError::AccountCreationFailed {
            reason: "EMAIL_ALREADY_EXISTS".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Account creation failed: EMAIL_ALREADY_EXISTS"
        );

        let error = ProvisioningError::RetriesExhausted {
            operation: "assume_role",
            attempts: 3,
            last_error: ProviderError::new(ProviderErrorKind::AccessDenied, "not authorized"),
        };
        assert_eq!(
            error.to_string(),
            "assume_role still failing after 3 attempts: not authorized"
        );
    }
}
