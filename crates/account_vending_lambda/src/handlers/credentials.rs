use account_vending_core::account::{member_role_arn, ROLE_SESSION_NAME};
use account_vending_core::retry::RetryPolicy;
use chrono::Utc;
use tracing::info;

use crate::adapters::credentials::{RoleAssumer, TemporaryCredentials};
use crate::adapters::sleep::Sleeper;
use crate::error::ProvisioningError;
use crate::handlers::retry::retry_transient;

/// Assumes the access role in the new account. Access-denied responses are
/// expected while the role propagates and are retried under `policy`.
pub fn assume_member_role(
    roles: &dyn RoleAssumer,
    sleeper: &dyn Sleeper,
    account_id: &str,
    role_name: &str,
    policy: &RetryPolicy,
) -> Result<TemporaryCredentials, ProvisioningError> {
    let credentials = retry_transient("assume_role", policy, sleeper, |attempt| {
        let role_arn = member_role_arn(account_id, role_name);
        info!(
            component = "credential_broker",
            event = "assume_role_attempt",
            attempt,
            role_arn = %role_arn
        );
        roles.assume_role(&role_arn, ROLE_SESSION_NAME)
    })?;

    let expires_in_secs = credentials
        .expiration
        .map(|expiration| (expiration - Utc::now()).num_seconds());
    info!(
        component = "credential_broker",
        event = "role_assumed",
        account_id = %account_id,
        expires_in_secs
    );
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::test_helpers::{CallJournal, FakeRoleAssumer, RecordingSleeper};

    const ROLE: &str = "AWSCloudFormationStackSetExecutionRole";

    #[test]
    fn keeps_retrying_under_unbounded_policy() {
        for failures in [0u32, 1, 5, 40, 250] {
            let roles = FakeRoleAssumer::new(CallJournal::default())
                .failing_times(failures, ProviderErrorKind::AccessDenied);
            let sleeper = RecordingSleeper::default();

            let credentials = assume_member_role(
                &roles,
                &sleeper,
                "222222222222",
                ROLE,
                &RetryPolicy::fixed(Duration::from_secs(60)),
            )
            .expect("role should eventually be assumed");

            assert_eq!(credentials.access_key_id, "ASIAMEMBER");
            assert_eq!(roles.attempts() as u32, failures + 1);
            assert_eq!(sleeper.sleeps().len() as u32, failures);
        }
    }

    #[test]
    fn recomputes_role_arn_on_every_attempt() {
        let roles = FakeRoleAssumer::new(CallJournal::default())
            .failing_times(3, ProviderErrorKind::AccessDenied);

        assume_member_role(
            &roles,
            &RecordingSleeper::default(),
            "222222222222",
            ROLE,
            &RetryPolicy::fixed(Duration::from_secs(60)),
        )
        .expect("role should be assumed");

        let expected = "arn:aws:iam::222222222222:role/AWSCloudFormationStackSetExecutionRole";
        assert_eq!(roles.requested_arns(), vec![expected.to_string(); 4]);
    }

    #[test]
    fn bounded_policy_gives_up_after_max_attempts() {
        let roles = FakeRoleAssumer::new(CallJournal::default())
            .failing_times(10, ProviderErrorKind::AccessDenied);

        let error = assume_member_role(
            &roles,
            &RecordingSleeper::default(),
            "222222222222",
            ROLE,
            &RetryPolicy::exponential(Duration::from_secs(10), Duration::from_secs(60))
                .with_max_attempts(5),
        )
        .expect_err("retries should be exhausted");

        assert!(matches!(
            error,
            ProvisioningError::RetriesExhausted {
                operation: "assume_role",
                attempts: 5,
                ..
            }
        ));
        assert_eq!(roles.attempts(), 5);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let roles = FakeRoleAssumer::new(CallJournal::default())
            .failing_times(1, ProviderErrorKind::Other);

        let error = assume_member_role(
            &roles,
            &RecordingSleeper::default(),
            "222222222222",
            ROLE,
            &RetryPolicy::fixed(Duration::from_secs(60)),
        )
        .expect_err("permanent error should surface");

        assert!(matches!(error, ProvisioningError::Provider(_)));
        assert_eq!(roles.attempts(), 1);
    }
}
