use std::future::Future;
use std::time::Duration;

use account_vending_core::account::{
    AccountCreationState, CreateAccountStatus, NewAccountRequest, OrganizationalUnit,
};
use account_vending_core::config::{ConfigError, ProvisioningConfig};
use account_vending_core::contract::LifecycleEvent;
use account_vending_core::retry::Deadline;
use account_vending_core::stack::{
    DeploymentRequest, StackDescription, StackEventRecord, StackParameter,
};
use account_vending_lambda::adapters::callback::CallbackSender;
use account_vending_lambda::adapters::credentials::{RoleAssumer, TemporaryCredentials};
use account_vending_lambda::adapters::deployment::{MemberAccountConnector, StackDeployer};
use account_vending_lambda::adapters::function::FunctionRemover;
use account_vending_lambda::adapters::network::NetworkCleaner;
use account_vending_lambda::adapters::organizations::OrganizationsApi;
use account_vending_lambda::adapters::sleep::ThreadSleeper;
use account_vending_lambda::adapters::templates::TemplateStore;
use account_vending_lambda::error::{ProviderError, ProviderErrorKind};
use account_vending_lambda::handlers::lifecycle::{handle_lifecycle_event, ProviderServices};
use account_vending_lambda::telemetry::init_tracing;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_ec2::types::Filter;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::{error, info};

/// Runs an SDK future to completion from synchronous adapter code.
fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn provider_error<E, R>(operation: &str, error: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ProviderErrorKind::Unavailable,
        _ => ProviderErrorKind::from_code(error.code()),
    };
    ProviderError::new(
        kind,
        format!("{operation} failed: {}", DisplayErrorContext(&error)),
    )
}

fn missing_field(operation: &str, field: &str) -> ProviderError {
    ProviderError::other(format!("{operation} response is missing {field}"))
}

struct OrganizationsClient {
    client: aws_sdk_organizations::Client,
}

fn account_status_from(
    status: &aws_sdk_organizations::types::CreateAccountStatus,
) -> CreateAccountStatus {
    CreateAccountStatus {
        request_id: status.id().unwrap_or_default().to_string(),
        state: status
            .state()
            .map(|state| AccountCreationState::parse(state.as_str()))
            .unwrap_or_else(|| AccountCreationState::Unknown("UNKNOWN".to_string())),
        account_id: status.account_id().map(str::to_string),
        failure_reason: status
            .failure_reason()
            .map(|reason| reason.as_str().to_string()),
    }
}

fn organizational_unit_from(
    unit: &aws_sdk_organizations::types::OrganizationalUnit,
) -> Option<OrganizationalUnit> {
    Some(OrganizationalUnit {
        id: unit.id()?.to_string(),
        name: unit.name()?.to_string(),
    })
}

impl OrganizationsApi for OrganizationsClient {
    fn create_account(
        &self,
        request: &NewAccountRequest,
    ) -> Result<CreateAccountStatus, ProviderError> {
        let output = block_on(
            self.client
                .create_account()
                .email(&request.email)
                .account_name(&request.account_name)
                .role_name(&request.role_name)
                .send(),
        )
        .map_err(|error| provider_error("organizations:CreateAccount", error))?;
        output
            .create_account_status()
            .map(account_status_from)
            .ok_or_else(|| missing_field("CreateAccount", "CreateAccountStatus"))
    }

    fn describe_create_account_status(
        &self,
        request_id: &str,
    ) -> Result<CreateAccountStatus, ProviderError> {
        let output = block_on(
            self.client
                .describe_create_account_status()
                .create_account_request_id(request_id)
                .send(),
        )
        .map_err(|error| provider_error("organizations:DescribeCreateAccountStatus", error))?;
        output
            .create_account_status()
            .map(account_status_from)
            .ok_or_else(|| missing_field("DescribeCreateAccountStatus", "CreateAccountStatus"))
    }

    fn root_id(&self) -> Result<String, ProviderError> {
        let output = block_on(self.client.list_roots().send())
            .map_err(|error| provider_error("organizations:ListRoots", error))?;
        output
            .roots()
            .iter()
            .find_map(|root| root.id())
            .map(str::to_string)
            .ok_or_else(|| missing_field("ListRoots", "Roots"))
    }

    fn list_organizational_units(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnit>, ProviderError> {
        let mut units = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = block_on(
                self.client
                    .list_organizational_units_for_parent()
                    .parent_id(parent_id)
                    .set_next_token(next_token.take())
                    .send(),
            )
            .map_err(|error| {
                provider_error("organizations:ListOrganizationalUnitsForParent", error)
            })?;
            units.extend(
                output
                    .organizational_units()
                    .iter()
                    .filter_map(organizational_unit_from),
            );
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(units),
            }
        }
    }

    fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ProviderError> {
        let output = block_on(
            self.client
                .create_organizational_unit()
                .parent_id(parent_id)
                .name(name)
                .send(),
        )
        .map_err(|error| provider_error("organizations:CreateOrganizationalUnit", error))?;
        output
            .organizational_unit()
            .and_then(organizational_unit_from)
            .ok_or_else(|| missing_field("CreateOrganizationalUnit", "OrganizationalUnit"))
    }

    fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ProviderError> {
        block_on(
            self.client
                .move_account()
                .account_id(account_id)
                .source_parent_id(source_parent_id)
                .destination_parent_id(destination_parent_id)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| provider_error("organizations:MoveAccount", error))
    }
}

struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

fn expiration_from(expiration: &aws_sdk_sts::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(expiration.secs(), 0)
}

impl RoleAssumer for StsRoleAssumer {
    fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ProviderError> {
        let output = block_on(
            self.client
                .assume_role()
                .role_arn(role_arn)
                .role_session_name(session_name)
                .send(),
        )
        .map_err(|error| provider_error("sts:AssumeRole", error))?;
        let credentials = output
            .credentials()
            .ok_or_else(|| missing_field("AssumeRole", "Credentials"))?;
        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: expiration_from(credentials.expiration()),
        })
    }
}

struct S3TemplateStore {
    client: aws_sdk_s3::Client,
}

impl TemplateStore for S3TemplateStore {
    fn fetch_template(&self, bucket: &str, key: &str) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let bytes = block_on(async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|error| provider_error("s3:GetObject", error))?;
            output
                .body
                .collect()
                .await
                .map(|aggregated| aggregated.into_bytes())
                .map_err(|error| ProviderError::other(format!("failed to read template body: {error}")))
        })?;
        String::from_utf8(bytes.to_vec())
            .map_err(|error| ProviderError::other(format!("template is not valid UTF-8: {error}")))
    }
}

fn cloudformation_parameters(parameters: &[StackParameter]) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|parameter| {
            Parameter::builder()
                .parameter_key(&parameter.key)
                .parameter_value(&parameter.value)
                .build()
        })
        .collect()
}

struct CloudFormationDeployer {
    client: aws_sdk_cloudformation::Client,
}

impl StackDeployer for CloudFormationDeployer {
    fn create_stack(&self, request: &DeploymentRequest) -> Result<String, ProviderError> {
        let output = block_on(
            self.client
                .create_stack()
                .stack_name(&request.stack_name)
                .template_body(&request.template_body)
                .set_parameters(Some(cloudformation_parameters(&request.parameters)))
                .capabilities(Capability::CapabilityNamedIam)
                .client_request_token(&request.client_request_token)
                .send(),
        )
        .map_err(|error| provider_error("cloudformation:CreateStack", error))?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or_else(|| missing_field("CreateStack", "StackId"))
    }

    fn latest_stack_event(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackEventRecord>, ProviderError> {
        let output = block_on(
            self.client
                .describe_stack_events()
                .stack_name(stack_name)
                .send(),
        )
        .map_err(|error| provider_error("cloudformation:DescribeStackEvents", error))?;
        // Events are returned newest first.
        Ok(output.stack_events().first().map(|event| StackEventRecord {
            logical_resource_id: event.logical_resource_id().unwrap_or_default().to_string(),
            resource_type: event.resource_type().unwrap_or_default().to_string(),
            resource_status: event
                .resource_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            resource_status_reason: event.resource_status_reason().map(str::to_string),
        }))
    }

    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError> {
        let output = block_on(self.client.describe_stacks().stack_name(stack_name).send())
            .map_err(|error| provider_error("cloudformation:DescribeStacks", error))?;
        let stack = output
            .stacks()
            .first()
            .ok_or_else(|| missing_field("DescribeStacks", "Stacks"))?;
        Ok(StackDescription {
            stack_id: stack.stack_id().unwrap_or_default().to_string(),
            stack_name: stack_name.to_string(),
            stack_status: stack.stack_status().as_str().to_string(),
            stack_status_reason: stack.stack_status_reason().map(str::to_string),
            outputs: stack
                .outputs()
                .iter()
                .filter_map(|output| {
                    Some((
                        output.output_key()?.to_string(),
                        output.output_value()?.to_string(),
                    ))
                })
                .collect(),
        })
    }
}

struct Ec2NetworkCleaner {
    client: aws_sdk_ec2::Client,
}

impl Ec2NetworkCleaner {
    fn filter(name: &str, value: &str) -> Filter {
        Filter::builder().name(name).values(value).build()
    }
}

impl NetworkCleaner for Ec2NetworkCleaner {
    fn default_vpc_ids(&self) -> Result<Vec<String>, ProviderError> {
        let output = block_on(
            self.client
                .describe_vpcs()
                .filters(Self::filter("isDefault", "true"))
                .send(),
        )
        .map_err(|error| provider_error("ec2:DescribeVpcs", error))?;
        Ok(output
            .vpcs()
            .iter()
            .filter_map(|vpc| vpc.vpc_id().map(str::to_string))
            .collect())
    }

    fn internet_gateway_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        let output = block_on(
            self.client
                .describe_internet_gateways()
                .filters(Self::filter("attachment.vpc-id", vpc_id))
                .send(),
        )
        .map_err(|error| provider_error("ec2:DescribeInternetGateways", error))?;
        Ok(output
            .internet_gateways()
            .iter()
            .filter_map(|gateway| gateway.internet_gateway_id().map(str::to_string))
            .collect())
    }

    fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), ProviderError> {
        block_on(
            self.client
                .detach_internet_gateway()
                .internet_gateway_id(gateway_id)
                .vpc_id(vpc_id)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| provider_error("ec2:DetachInternetGateway", error))
    }

    fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), ProviderError> {
        block_on(
            self.client
                .delete_internet_gateway()
                .internet_gateway_id(gateway_id)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| provider_error("ec2:DeleteInternetGateway", error))
    }

    fn subnet_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        let output = block_on(
            self.client
                .describe_subnets()
                .filters(Self::filter("vpc-id", vpc_id))
                .send(),
        )
        .map_err(|error| provider_error("ec2:DescribeSubnets", error))?;
        Ok(output
            .subnets()
            .iter()
            .filter_map(|subnet| subnet.subnet_id().map(str::to_string))
            .collect())
    }

    fn delete_subnet(&self, subnet_id: &str) -> Result<(), ProviderError> {
        block_on(self.client.delete_subnet().subnet_id(subnet_id).send())
            .map(|_| ())
            .map_err(|error| provider_error("ec2:DeleteSubnet", error))
    }

    fn delete_vpc(&self, vpc_id: &str) -> Result<(), ProviderError> {
        block_on(self.client.delete_vpc().vpc_id(vpc_id).send())
            .map(|_| ())
            .map_err(|error| provider_error("ec2:DeleteVpc", error))
    }
}

/// Builds member-account clients from the function's shared SDK config with
/// the assumed-role credentials and a target region swapped in.
struct AwsMemberAccountConnector {
    shared_config: SdkConfig,
}

impl AwsMemberAccountConnector {
    fn session_credentials(credentials: &TemporaryCredentials) -> aws_sdk_sts::config::Credentials {
        aws_sdk_sts::config::Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            "member-account-role",
        )
    }
}

impl MemberAccountConnector for AwsMemberAccountConnector {
    fn stack_deployer<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn StackDeployer + 'a> {
        let config = aws_sdk_cloudformation::config::Builder::from(&self.shared_config)
            .region(aws_sdk_cloudformation::config::Region::new(region.to_string()))
            .credentials_provider(Self::session_credentials(credentials))
            .build();
        Box::new(CloudFormationDeployer {
            client: aws_sdk_cloudformation::Client::from_conf(config),
        })
    }

    fn network_cleaner<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn NetworkCleaner + 'a> {
        let config = aws_sdk_ec2::config::Builder::from(&self.shared_config)
            .region(aws_sdk_ec2::config::Region::new(region.to_string()))
            .credentials_provider(Self::session_credentials(credentials))
            .build();
        Box::new(Ec2NetworkCleaner {
            client: aws_sdk_ec2::Client::from_conf(config),
        })
    }
}

struct ReqwestCallbackSender {
    client: reqwest::Client,
}

impl CallbackSender for ReqwestCallbackSender {
    fn put_response(&self, response_url: &str, body: &str) -> Result<(), ProviderError> {
        // The pre-signed URL is signed without a content type.
        let request = self
            .client
            .put(response_url)
            .header(reqwest::header::CONTENT_TYPE, "")
            .body(body.to_string());
        block_on(async move {
            let response = request.send().await.map_err(|error| {
                ProviderError::new(
                    ProviderErrorKind::Unavailable,
                    format!("callback PUT failed: {error}"),
                )
            })?;
            let status = response.status();
            response
                .error_for_status()
                .map(|_| ())
                .map_err(|error| ProviderError::other(format!("callback rejected ({status}): {error}")))
        })
    }
}

struct LambdaFunctionRemover {
    client: aws_sdk_lambda::Client,
}

impl FunctionRemover for LambdaFunctionRemover {
    fn delete_function(&self, function_name: &str) -> Result<(), ProviderError> {
        block_on(
            self.client
                .delete_function()
                .function_name(function_name)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| provider_error("lambda:DeleteFunction", error))
    }
}

struct VendingRuntime {
    config: Result<ProvisioningConfig, ConfigError>,
    organizations: OrganizationsClient,
    roles: StsRoleAssumer,
    templates: S3TemplateStore,
    member_accounts: AwsMemberAccountConnector,
    callback: ReqwestCallbackSender,
    functions: LambdaFunctionRemover,
    sleeper: ThreadSleeper,
}

impl VendingRuntime {
    fn new(shared_config: SdkConfig, config: Result<ProvisioningConfig, ConfigError>) -> Self {
        Self {
            config,
            organizations: OrganizationsClient {
                client: aws_sdk_organizations::Client::new(&shared_config),
            },
            roles: StsRoleAssumer {
                client: aws_sdk_sts::Client::new(&shared_config),
            },
            templates: S3TemplateStore {
                client: aws_sdk_s3::Client::new(&shared_config),
            },
            functions: LambdaFunctionRemover {
                client: aws_sdk_lambda::Client::new(&shared_config),
            },
            callback: ReqwestCallbackSender {
                client: reqwest::Client::new(),
            },
            member_accounts: AwsMemberAccountConnector { shared_config },
            sleeper: ThreadSleeper,
        }
    }

    fn services(&self) -> ProviderServices<'_> {
        ProviderServices {
            organizations: &self.organizations,
            roles: &self.roles,
            templates: &self.templates,
            member_accounts: &self.member_accounts,
            callback: &self.callback,
            functions: &self.functions,
            sleeper: &self.sleeper,
        }
    }
}

fn parse_lifecycle_event(payload: Value) -> Result<LifecycleEvent, Error> {
    serde_json::from_value(payload)
        .map_err(|error| Error::from(format!("invalid CloudFormation custom resource event: {error}")))
}

/// Kept back from every wait for the callback PUT and DeleteFunction.
const COMPLETION_RESERVE: Duration = Duration::from_secs(30);

/// `deadline_ms` is the invocation deadline in epoch milliseconds, as the
/// runtime API reports it.
fn invocation_deadline(deadline_ms: u64, now_ms: i64) -> Deadline {
    let now_ms = u64::try_from(now_ms).unwrap_or(0);
    let remaining = Duration::from_millis(deadline_ms.saturating_sub(now_ms));
    Deadline::after(remaining, COMPLETION_RESERVE)
}

async fn handle_request(event: LambdaEvent<Value>, runtime: &VendingRuntime) -> Result<Value, Error> {
    let function_name = event.context.env_config.function_name.clone();
    let deadline = invocation_deadline(event.context.deadline, Utc::now().timestamp_millis());
    info!(
        component = "lambda_entrypoint",
        event = "invocation_started",
        request_id = %event.context.request_id,
        wait_budget_secs = deadline.wait_budget().map(|budget| budget.as_secs())
    );
    let lifecycle_event = parse_lifecycle_event(event.payload).inspect_err(|parse_error| {
        error!(
            component = "lambda_entrypoint",
            event = "invalid_payload",
            error = %parse_error
        );
    })?;

    let outcome = tokio::task::block_in_place(|| {
        handle_lifecycle_event(
            &lifecycle_event,
            &function_name,
            runtime.config.as_ref(),
            &deadline,
            &runtime.services(),
        )
    });

    serde_json::to_value(outcome)
        .map_err(|error| Error::from(format!("failed to serialize lifecycle outcome: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing("info");

    let config = ProvisioningConfig::from_env();
    if let Err(config_error) = &config {
        error!(
            component = "lambda_entrypoint",
            event = "configuration_invalid",
            error = %config_error
        );
    }

    let shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let runtime = VendingRuntime::new(shared_config, config);
    info!(component = "lambda_entrypoint", event = "runtime_ready");

    lambda_runtime::run(service_fn(|event: LambdaEvent<Value>| {
        handle_request(event, &runtime)
    }))
    .await
}

#[cfg(test)]
mod tests {
    use aws_sdk_organizations::types::{
        CreateAccountFailureReason, CreateAccountState, CreateAccountStatus as SdkAccountStatus,
    };
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_account_status_from_sdk_shape() {
        let status = SdkAccountStatus::builder()
            .id("car-1")
            .state(CreateAccountState::Failed)
            .failure_reason(CreateAccountFailureReason::EmailAlreadyExists)
            .build();

        let converted = account_status_from(&status);

        assert_eq!(converted.request_id, "car-1");
        assert_eq!(converted.state, AccountCreationState::Failed);
        assert_eq!(converted.account_id, None);
        assert_eq!(
            converted.failure_reason.as_deref(),
            Some("EMAIL_ALREADY_EXISTS")
        );
    }

    #[test]
    fn missing_state_is_not_terminal() {
        let converted = account_status_from(&SdkAccountStatus::builder().id("car-2").build());

        assert!(!converted.state.is_terminal());
    }

    #[test]
    fn stack_parameters_keep_order_and_values() {
        let parameters = cloudformation_parameters(&[
            StackParameter {
                key: "BusinessUnit".to_string(),
                value: "analytics".to_string(),
            },
            StackParameter {
                key: "PublicSubnetACidr".to_string(),
                value: "10.0.0.0/24".to_string(),
            },
        ]);

        assert_eq!(parameters[0].parameter_key(), Some("BusinessUnit"));
        assert_eq!(parameters[1].parameter_value(), Some("10.0.0.0/24"));
    }

    #[test]
    fn expiration_converts_epoch_seconds() {
        let expiration = aws_sdk_sts::primitives::DateTime::from_secs(1_700_000_000);

        let converted = expiration_from(&expiration).expect("timestamp should convert");

        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parses_cloudformation_create_event() {
        let event = parse_lifecycle_event(json!({
            "RequestType": "Create",
            "ServiceToken": "arn:aws:lambda:eu-west-1:111111111111:function:account-vending",
            "ResponseURL": "https://cloudformation-custom-resource-response.example.com/signed",
            "StackId": "arn:aws:cloudformation:eu-west-1:111111111111:stack/vending/guid",
            "RequestId": "req-1",
            "ResourceType": "Custom::AccountVending",
            "LogicalResourceId": "MemberAccount",
            "ResourceProperties": {"ServiceToken": "arn"}
        }))
        .expect("event should parse");

        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.logical_resource_id, "MemberAccount");
    }

    #[test]
    fn invocation_deadline_keeps_completion_reserve() {
        let now_ms = 1_700_000_000_000i64;
        let deadline_ms = 1_700_000_120_000u64;

        let budget = invocation_deadline(deadline_ms, now_ms)
            .wait_budget()
            .expect("deadline is set");

        assert!(budget <= Duration::from_secs(90));
        assert!(budget > Duration::from_secs(80));
    }

    #[test]
    fn passed_deadline_leaves_no_wait_budget() {
        let deadline = invocation_deadline(1_700_000_000_000, 1_700_000_010_000);

        assert_eq!(deadline.wait_budget(), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_event_without_response_url() {
        let error = parse_lifecycle_event(json!({"RequestType": "Create"}))
            .expect_err("incomplete event should fail");

        assert!(error.to_string().contains("invalid CloudFormation"));
    }
}
