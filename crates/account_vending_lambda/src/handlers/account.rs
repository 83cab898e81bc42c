use account_vending_core::account::{AccountCreationState, NewAccountRequest};
use account_vending_core::config::WaitPolicies;
use account_vending_core::retry::{Deadline, RetryPolicy};
use tracing::{error, info};

use crate::adapters::organizations::OrganizationsApi;
use crate::adapters::sleep::Sleeper;
use crate::error::ProvisioningError;
use crate::handlers::retry::poll_until;

/// Creates the member account and waits for its id. Each wait is capped by
/// what `deadline` has left when it starts.
pub fn create_member_account(
    organizations: &dyn OrganizationsApi,
    sleeper: &dyn Sleeper,
    request: &NewAccountRequest,
    policies: &WaitPolicies,
    deadline: &Deadline,
) -> Result<String, ProvisioningError> {
    info!(
        component = "account_provisioner",
        event = "account_creation_started",
        account_name = %request.account_name,
        email = %request.email,
        role_name = %request.role_name
    );

    let submitted = organizations.create_account(request)?;
    let request_id = submitted.request_id.clone();

    let settled = if submitted.state.is_terminal() {
        submitted
    } else {
        poll_until(
            "describe_create_account_status",
            &deadline.cap(&policies.account_status),
            sleeper,
            || {
                let status = organizations.describe_create_account_status(&request_id)?;
                info!(
                    component = "account_provisioner",
                    event = "account_creation_status",
                    request_id = %request_id,
                    state = status.state.as_str()
                );
                Ok(status.state.is_terminal().then_some(status))
            },
        )?
    };

    if settled.state == AccountCreationState::Failed {
        let reason = settled
            .failure_reason
            .clone()
            .unwrap_or_else(|| "UNKNOWN".to_string());
        error!(
            component = "account_provisioner",
            event = "account_creation_failed",
            request_id = %request_id,
            reason = %reason
        );
        return Err(ProvisioningError::AccountCreationFailed { reason });
    }

    let account_id = match settled.resolved_account_id() {
        Some(account_id) => account_id.to_string(),
        None => wait_for_account_id(
            organizations,
            sleeper,
            &request_id,
            &deadline.cap(&policies.account_id),
        )?,
    };

    info!(
        component = "account_provisioner",
        event = "account_created",
        request_id = %request_id,
        account_id = %account_id
    );
    Ok(account_id)
}

/// The id can lag behind the SUCCEEDED state; keep reading the status until
/// it is populated.
pub fn wait_for_account_id(
    organizations: &dyn OrganizationsApi,
    sleeper: &dyn Sleeper,
    request_id: &str,
    policy: &RetryPolicy,
) -> Result<String, ProvisioningError> {
    poll_until("resolve_account_id", policy, sleeper, || {
        let status = organizations.describe_create_account_status(request_id)?;
        let account_id = status.resolved_account_id().map(str::to_string);
        if account_id.is_none() {
            info!(
                component = "account_provisioner",
                event = "account_id_pending",
                request_id = %request_id,
                state = status.state.as_str()
            );
        }
        Ok(account_id)
    })
}
