use account_vending_core::config::{ProvisioningConfig, WaitPolicies};
use account_vending_core::retry::Deadline;
use account_vending_core::stack::{
    classify_stack_event, client_request_token, DeploymentOutcome, DeploymentRequest,
    StackDescription,
};
use tracing::{error, info};

use crate::adapters::deployment::StackDeployer;
use crate::adapters::sleep::Sleeper;
use crate::adapters::templates::TemplateStore;
use crate::error::ProvisioningError;
use crate::handlers::retry::{poll_until, retry_transient};

pub fn fetch_template(
    templates: &dyn TemplateStore,
    config: &ProvisioningConfig,
) -> Result<String, ProvisioningError> {
    let body = templates.fetch_template(&config.template_bucket, &config.template_key)?;
    if body.trim().is_empty() {
        return Err(ProvisioningError::Template(format!(
            "s3://{}/{} is empty",
            config.template_bucket, config.template_key
        )));
    }
    info!(
        component = "resource_deployer",
        event = "template_fetched",
        bucket = %config.template_bucket,
        key = %config.template_key,
        bytes = body.len()
    );
    Ok(body)
}

pub fn build_deployment_request(
    config: &ProvisioningConfig,
    template_body: String,
    cfn_request_id: &str,
) -> DeploymentRequest {
    DeploymentRequest {
        stack_name: config.stack_name.clone(),
        region: config.stack_region.clone(),
        template_body,
        parameters: config.stack_parameters.clone(),
        client_request_token: client_request_token(cfn_request_id),
    }
}

/// Submits the baseline stack and waits for its top-level terminal event.
pub fn deploy_baseline(
    deployer: &dyn StackDeployer,
    sleeper: &dyn Sleeper,
    request: &DeploymentRequest,
    policies: &WaitPolicies,
    deadline: &Deadline,
) -> Result<DeploymentOutcome, ProvisioningError> {
    let stack_id = retry_transient(
        "create_stack",
        &deadline.cap(&policies.stack_submission),
        sleeper,
        |attempt| {
            info!(
                component = "resource_deployer",
                event = "stack_submission",
                attempt,
                stack_name = %request.stack_name,
                region = %request.region
            );
            deployer.create_stack(request)
        },
    )?;
    info!(
        component = "resource_deployer",
        event = "stack_submitted",
        stack_id = %stack_id
    );

    let terminal = poll_until(
        "describe_stack_events",
        &deadline.cap(&policies.stack_events),
        sleeper,
        || {
            let Some(latest) = deployer.latest_stack_event(&request.stack_name)? else {
                return Ok(None);
            };
            info!(
                component = "resource_deployer",
                event = "stack_event",
                logical_resource_id = %latest.logical_resource_id,
                resource_type = %latest.resource_type,
                resource_status = %latest.resource_status
            );
            Ok(classify_stack_event(&request.stack_name, &latest))
        },
    )?;

    let description = deployer.describe_stack(&request.stack_name)?;
    Ok(DeploymentOutcome::from_terminal(terminal, description))
}

/// Only a completed stack lets provisioning continue; rollback is a failure.
pub fn require_completed(outcome: DeploymentOutcome) -> Result<StackDescription, ProvisioningError> {
    match outcome {
        DeploymentOutcome::Completed(description) => {
            info!(
                component = "resource_deployer",
                event = "stack_completed",
                stack_id = %description.stack_id
            );
            Ok(description)
        }
        DeploymentOutcome::RolledBack(description) => {
            let reason = status_reason(&description);
            error!(
                component = "resource_deployer",
                event = "stack_rolled_back",
                stack_id = %description.stack_id,
                reason = %reason
            );
            Err(ProvisioningError::DeploymentRolledBack {
                stack_name: description.stack_name,
                reason,
            })
        }
        DeploymentOutcome::Failed(description) => {
            let reason = status_reason(&description);
            error!(
                component = "resource_deployer",
                event = "stack_failed",
                stack_id = %description.stack_id,
                status = %description.stack_status,
                reason = %reason
            );
            Err(ProvisioningError::DeploymentFailed {
                stack_name: description.stack_name,
                status: description.stack_status,
                reason,
            })
        }
    }
}

fn status_reason(description: &StackDescription) -> String {
    description
        .stack_status_reason
        .clone()
        .unwrap_or_else(|| "no reason reported".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use account_vending_core::stack::StackEventRecord;

    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::test_helpers::{
        sample_config, stack_event, CallJournal, FakeStackDeployer, FakeTemplateStore,
        RecordingSleeper,
    };

    fn request() -> DeploymentRequest {
        build_deployment_request(&sample_config(), "Resources: {}".to_string(), "req-1")
    }

    #[test]
    fn request_carries_configured_parameters_and_token() {
        let config = sample_config();
        let request = build_deployment_request(&config, "body".to_string(), "req-1");

        assert_eq!(request.stack_name, config.stack_name);
        assert_eq!(request.region, config.stack_region);
        assert_eq!(request.parameters, config.stack_parameters);
        assert_eq!(request.client_request_token, client_request_token("req-1"));
    }

    #[test]
    fn create_complete_returns_description_without_resubmitting() {
        let journal = CallJournal::default();
        let deployer = FakeStackDeployer::new(journal.clone()).with_events(vec![
            None,
            Some(stack_event("Vpc", "AWS::EC2::VPC", "CREATE_COMPLETE")),
            Some(stack_event(
                "baseline-network",
                "AWS::CloudFormation::Stack",
                "CREATE_COMPLETE",
            )),
        ]);

        let outcome = deploy_baseline(
            &deployer,
            &RecordingSleeper::default(),
            &request(),
            &sample_config().wait_policies,
            &Deadline::unlimited(),
        )
        .expect("deployment should finish");

        let description = require_completed(outcome).expect("stack should be complete");
        assert_eq!(description.stack_status, "CREATE_COMPLETE");
        assert_eq!(journal.count("stack.create_stack"), 1);
        assert_eq!(journal.count("stack.latest_stack_event"), 3);
    }

    #[test]
    fn rollback_is_reported_as_failure() {
        let deployer = FakeStackDeployer::new(CallJournal::default())
            .with_events(vec![Some(stack_event(
                "baseline-network",
                "AWS::CloudFormation::Stack",
                "ROLLBACK_COMPLETE",
            ))])
            .with_final_status("ROLLBACK_COMPLETE", Some("Subnet CIDR overlaps"));

        let outcome = deploy_baseline(
            &deployer,
            &RecordingSleeper::default(),
            &request(),
            &sample_config().wait_policies,
            &Deadline::unlimited(),
        )
        .expect("deployment should reach a terminal state");

        assert!(matches!(outcome, DeploymentOutcome::RolledBack(_)));
        assert_eq!(
            require_completed(outcome).expect_err("rollback is fatal"),
            ProvisioningError::DeploymentRolledBack {
                stack_name: "baseline-network".to_string(),
                reason: "Subnet CIDR overlaps".to_string(),
            }
        );
    }

    #[test]
    fn transient_submission_failures_are_retried() {
        let journal = CallJournal::default();
        let deployer = FakeStackDeployer::new(journal.clone())
            .failing_submissions(2, ProviderErrorKind::AccessDenied)
            .with_events(vec![Some(StackEventRecord {
                logical_resource_id: "baseline-network".to_string(),
                resource_type: "AWS::CloudFormation::Stack".to_string(),
                resource_status: "CREATE_COMPLETE".to_string(),
                resource_status_reason: None,
            })]);
        let sleeper = RecordingSleeper::default();

        deploy_baseline(
            &deployer,
            &sleeper,
            &request(),
            &sample_config().wait_policies,
            &Deadline::unlimited(),
        )
        .expect("deployment should succeed");

        assert_eq!(journal.count("stack.create_stack"), 3);
        assert_eq!(sleeper.sleeps().len(), 2);
        let tokens: Vec<_> = deployer
            .submissions()
            .into_iter()
            .map(|submission| submission.client_request_token)
            .collect();
        assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn stalled_stack_gives_up_inside_the_deadline() {
        let journal = CallJournal::default();
        let deployer = FakeStackDeployer::new(journal.clone()).with_events(vec![Some(
            stack_event("Vpc", "AWS::EC2::VPC", "CREATE_IN_PROGRESS"),
        )]);
        let sleeper = RecordingSleeper::default();

        let error = deploy_baseline(
            &deployer,
            &sleeper,
            &request(),
            &sample_config().wait_policies,
            &Deadline::after(Duration::from_secs(60), Duration::from_secs(30)),
        )
        .expect_err("stack never settles");

        assert!(matches!(
            error,
            ProvisioningError::PollTimedOut {
                operation: "describe_stack_events",
                ..
            }
        ));
        assert!(sleeper.sleeps().iter().sum::<Duration>() <= Duration::from_secs(30));
        assert_eq!(journal.count("stack.describe_stack"), 0);
    }

    #[test]
    fn empty_template_is_rejected() {
        let error = fetch_template(&FakeTemplateStore::new("  \n"), &sample_config())
            .expect_err("empty template should fail");

        assert!(matches!(error, ProvisioningError::Template(_)));
    }
}
