//! Dispatch of CloudFormation lifecycle events.
//!
//! Create runs the provisioning pipeline: account creation, role
//! assumption, optional default VPC cleanup, baseline stack deployment and
//! OU placement. Each fatal failure ends in a FAILED callback followed by
//! deletion of this function. Update acknowledges without touching the
//! provider. Delete acknowledges and deletes this function.

use std::collections::BTreeMap;

use account_vending_core::account::console_login_url;
use account_vending_core::config::{ConfigError, ProvisioningConfig};
use account_vending_core::retry::Deadline;
use account_vending_core::contract::{
    delete_response, failure_response, success_response, update_response, LifecycleEvent,
    RequestType, ResponseData, SUCCESS_MESSAGE,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapters::callback::CallbackSender;
use crate::adapters::credentials::RoleAssumer;
use crate::adapters::deployment::MemberAccountConnector;
use crate::adapters::function::FunctionRemover;
use crate::adapters::organizations::OrganizationsApi;
use crate::adapters::sleep::Sleeper;
use crate::adapters::templates::TemplateStore;
use crate::error::ProvisioningError;
use crate::handlers::account::create_member_account;
use crate::handlers::credentials::assume_member_role;
use crate::handlers::deployment::{
    build_deployment_request, deploy_baseline, fetch_template, require_completed,
};
use crate::handlers::network::clean_default_networks;
use crate::handlers::notify::deliver_response;
use crate::handlers::placement::place_account;

pub struct ProviderServices<'a> {
    pub organizations: &'a dyn OrganizationsApi,
    pub roles: &'a dyn RoleAssumer,
    pub templates: &'a dyn TemplateStore,
    pub member_accounts: &'a dyn MemberAccountConnector,
    pub callback: &'a dyn CallbackSender,
    pub functions: &'a dyn FunctionRemover,
    pub sleeper: &'a dyn Sleeper,
}

/// Stage a Create failed in. Network cleanup and OU placement are best
/// effort and never fail the request, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStage {
    LoadingConfiguration,
    CreatingAccount,
    AssumingRole,
    DeployingResources,
}

impl ProvisioningStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadingConfiguration => "loading_configuration",
            Self::CreatingAccount => "creating_account",
            Self::AssumingRole => "assuming_role",
            Self::DeployingResources => "deploying_resources",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: ProvisioningStage,
    pub error: ProvisioningError,
}

impl StageFailure {
    pub fn reason(&self) -> String {
        format!("{} (stage: {})", self.error, self.stage.as_str())
    }
}

fn at(stage: ProvisioningStage) -> impl Fn(ProvisioningError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub account_id: String,
    pub account_role: String,
    pub login_url: String,
    pub stack_id: String,
    pub stack_outputs: BTreeMap<String, String>,
    pub organizational_unit_id: Option<String>,
    pub removed_default_vpcs: BTreeMap<String, Vec<String>>,
}

impl ProvisionReport {
    pub fn response_data(&self) -> ResponseData {
        let mut data = ResponseData::from([
            ("Message".to_string(), SUCCESS_MESSAGE.to_string()),
            ("AccountID".to_string(), self.account_id.clone()),
            ("AccountRole".to_string(), self.account_role.clone()),
            ("LoginURL".to_string(), self.login_url.clone()),
            ("StackId".to_string(), self.stack_id.clone()),
        ]);
        if let Some(organizational_unit_id) = &self.organizational_unit_id {
            data.insert(
                "OrganizationalUnitId".to_string(),
                organizational_unit_id.clone(),
            );
        }
        data
    }
}

/// Summary returned to the Lambda runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LifecycleOutcome {
    Provisioned {
        report: ProvisionReport,
        callback_delivered: bool,
    },
    Updated {
        callback_delivered: bool,
    },
    DeleteInitiated {
        callback_delivered: bool,
        function_deleted: bool,
    },
    Failed {
        stage: ProvisioningStage,
        reason: String,
        callback_delivered: bool,
        function_deleted: bool,
    },
}

/// Entry point for one invocation. Never fails: every error ends up in the
/// callback payload and the returned outcome. Waits give up early enough
/// for the callback and self-delete to run before `deadline`.
pub fn handle_lifecycle_event(
    event: &LifecycleEvent,
    function_name: &str,
    config: Result<&ProvisioningConfig, &ConfigError>,
    deadline: &Deadline,
    services: &ProviderServices<'_>,
) -> LifecycleOutcome {
    info!(
        component = "lifecycle_dispatcher",
        event = "lifecycle_event_received",
        request_type = event.request_type.as_str(),
        request_id = %event.request_id,
        logical_resource_id = %event.logical_resource_id,
        stack_id = %event.stack_id
    );

    match event.request_type {
        RequestType::Create => handle_create(event, function_name, config, deadline, services),
        RequestType::Update => handle_update(event, services),
        RequestType::Delete => handle_delete(event, function_name, services),
    }
}

fn handle_create(
    event: &LifecycleEvent,
    function_name: &str,
    config: Result<&ProvisioningConfig, &ConfigError>,
    deadline: &Deadline,
    services: &ProviderServices<'_>,
) -> LifecycleOutcome {
    let result = config
        .map_err(|config_error| StageFailure {
            stage: ProvisioningStage::LoadingConfiguration,
            error: ProvisioningError::Configuration(config_error.clone()),
        })
        .and_then(|config| provision_account(event, config, deadline, services));

    match result {
        Ok(report) => {
            let response = success_response(event, report.response_data());
            let callback_delivered = deliver_response(services.callback, event, &response);
            info!(
                component = "lifecycle_dispatcher",
                event = "provisioning_completed",
                account_id = %report.account_id,
                callback_delivered
            );
            LifecycleOutcome::Provisioned {
                report,
                callback_delivered,
            }
        }
        Err(failure) => {
            let reason = failure.reason();
            error!(
                component = "lifecycle_dispatcher",
                event = "provisioning_failed",
                stage = failure.stage.as_str(),
                reason = %reason
            );
            let response = failure_response(event, &reason);
            let callback_delivered = deliver_response(services.callback, event, &response);
            let function_deleted = delete_own_function(services.functions, function_name);
            LifecycleOutcome::Failed {
                stage: failure.stage,
                reason,
                callback_delivered,
                function_deleted,
            }
        }
    }
}

/// Runs the Create pipeline up to, but not including, the callback.
pub fn provision_account(
    event: &LifecycleEvent,
    config: &ProvisioningConfig,
    deadline: &Deadline,
    services: &ProviderServices<'_>,
) -> Result<ProvisionReport, StageFailure> {
    let policies = &config.wait_policies;

    let account_id = create_member_account(
        services.organizations,
        services.sleeper,
        &config.new_account_request(),
        policies,
        deadline,
    )
    .map_err(at(ProvisioningStage::CreatingAccount))?;

    let credentials = assume_member_role(
        services.roles,
        services.sleeper,
        &account_id,
        &config.account_role_name,
        &deadline.cap(&policies.role_assumption),
    )
    .map_err(at(ProvisioningStage::AssumingRole))?;

    let removed_default_vpcs = if config.cleanup_regions.is_empty() {
        BTreeMap::new()
    } else {
        info!(
            component = "lifecycle_dispatcher",
            event = "stage_started",
            step = "cleaning_network"
        );
        clean_default_networks(services.member_accounts, &credentials, &config.cleanup_regions)
    };

    let template_body = fetch_template(services.templates, config)
        .map_err(at(ProvisioningStage::DeployingResources))?;
    let request = build_deployment_request(config, template_body, &event.request_id);
    let deployer = services
        .member_accounts
        .stack_deployer(&credentials, &config.stack_region);
    let stack = deploy_baseline(&*deployer, services.sleeper, &request, policies, deadline)
        .and_then(require_completed)
        .map_err(at(ProvisioningStage::DeployingResources))?;

    let organizational_unit_id = match &config.organizational_unit_name {
        None => None,
        Some(name) => match place_account(services.organizations, &account_id, name) {
            Ok(organizational_unit_id) => Some(organizational_unit_id),
            Err(placement_error) => {
                warn!(
                    component = "lifecycle_dispatcher",
                    event = "placement_skipped",
                    step = "placing_in_ou",
                    organizational_unit_name = %name,
                    error = %placement_error
                );
                None
            }
        },
    };

    Ok(ProvisionReport {
        login_url: console_login_url(&account_id),
        account_id,
        account_role: config.account_role_name.clone(),
        stack_id: stack.stack_id,
        stack_outputs: stack.outputs,
        organizational_unit_id,
        removed_default_vpcs,
    })
}

fn handle_update(event: &LifecycleEvent, services: &ProviderServices<'_>) -> LifecycleOutcome {
    info!(
        component = "lifecycle_dispatcher",
        event = "update_ignored",
        request_id = %event.request_id
    );
    let callback_delivered = deliver_response(services.callback, event, &update_response(event));
    LifecycleOutcome::Updated { callback_delivered }
}

fn handle_delete(
    event: &LifecycleEvent,
    function_name: &str,
    services: &ProviderServices<'_>,
) -> LifecycleOutcome {
    let callback_delivered = deliver_response(services.callback, event, &delete_response(event));
    let function_deleted = delete_own_function(services.functions, function_name);
    LifecycleOutcome::DeleteInitiated {
        callback_delivered,
        function_deleted,
    }
}

/// Irreversible; only called as the last step of a Delete or a failed Create.
fn delete_own_function(functions: &dyn FunctionRemover, function_name: &str) -> bool {
    info!(
        component = "lifecycle_dispatcher",
        event = "self_delete_started",
        function_name = %function_name
    );
    match functions.delete_function(function_name) {
        Ok(()) => true,
        Err(delete_error) => {
            error!(
                component = "lifecycle_dispatcher",
                event = "self_delete_failed",
                function_name = %function_name,
                error = %delete_error
            );
            false
        }
    }
}
