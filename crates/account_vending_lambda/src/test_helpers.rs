//! Recording fakes for the adapter traits.
//!
//! Every fake writes to a shared [`CallJournal`] so tests can assert on the
//! order of provider calls across services. Queued responses repeat their
//! last entry once exhausted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use account_vending_core::account::{
    AccountCreationState, CreateAccountStatus, NewAccountRequest, OrganizationalUnit,
};
use account_vending_core::config::ProvisioningConfig;
use account_vending_core::contract::{CallbackResponse, LifecycleEvent, RequestType};
use account_vending_core::stack::{
    DeploymentRequest, StackDescription, StackEventRecord, STACK_RESOURCE_TYPE,
};

use crate::adapters::callback::CallbackSender;
use crate::adapters::credentials::{RoleAssumer, TemporaryCredentials};
use crate::adapters::deployment::{MemberAccountConnector, StackDeployer};
use crate::adapters::function::FunctionRemover;
use crate::adapters::network::NetworkCleaner;
use crate::adapters::organizations::OrganizationsApi;
use crate::adapters::sleep::Sleeper;
use crate::adapters::templates::TemplateStore;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::handlers::lifecycle::ProviderServices;

pub const TEST_ACCOUNT_ID: &str = "222222222222";
pub const TEST_FUNCTION_NAME: &str = "account-vending";

/// Ordered log of provider calls shared by all fakes of one test.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("poisoned mutex")
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("poisoned mutex").clone()
    }

    /// Counts entries equal to `call` or starting with `call` followed by
    /// arguments.
    pub fn count(&self, call: &str) -> usize {
        let prefix = format!("{call} ");
        self.entries()
            .iter()
            .filter(|entry| entry.as_str() == call || entry.starts_with(&prefix))
            .count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        let prefix = format!("{call} ");
        self.entries()
            .iter()
            .position(|entry| entry.as_str() == call || entry.starts_with(&prefix))
    }
}

fn take_or_repeat<T: Clone>(queue: &Mutex<Vec<T>>) -> Option<T> {
    let mut queue = queue.lock().expect("poisoned mutex");
    match queue.len() {
        0 => None,
        1 => Some(queue[0].clone()),
        _ => Some(queue.remove(0)),
    }
}

fn consume_failure(remaining: &Mutex<u32>) -> bool {
    let mut remaining = remaining.lock().expect("poisoned mutex");
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("poisoned mutex").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("poisoned mutex").push(duration);
    }
}

pub fn account_status(state: AccountCreationState, account_id: Option<&str>) -> CreateAccountStatus {
    CreateAccountStatus {
        request_id: "car-1".to_string(),
        state,
        account_id: account_id.map(str::to_string),
        failure_reason: None,
    }
}

pub fn stack_event(logical_resource_id: &str, resource_type: &str, status: &str) -> StackEventRecord {
    StackEventRecord {
        logical_resource_id: logical_resource_id.to_string(),
        resource_type: resource_type.to_string(),
        resource_status: status.to_string(),
        resource_status_reason: None,
    }
}

pub fn sample_credentials() -> TemporaryCredentials {
    TemporaryCredentials {
        access_key_id: "ASIAMEMBER".to_string(),
        secret_access_key: "member-secret".to_string(),
        session_token: "member-session".to_string(),
        expiration: None,
    }
}

pub fn sample_event(request_type: RequestType) -> LifecycleEvent {
    LifecycleEvent {
        request_type,
        service_token: "arn:aws:lambda:eu-west-1:111111111111:function:account-vending"
            .to_string(),
        response_url: "https://cloudformation-custom-resource-response.example.com/signed"
            .to_string(),
        stack_id: "arn:aws:cloudformation:eu-west-1:111111111111:stack/vending/guid".to_string(),
        request_id: "req-7f3a".to_string(),
        logical_resource_id: "MemberAccount".to_string(),
        resource_type: Some("Custom::AccountVending".to_string()),
        physical_resource_id: None,
        resource_properties: None,
    }
}

pub fn sample_env() -> HashMap<String, String> {
    let mut env = HashMap::from([
        ("AccountName".to_string(), "analytics-dev".to_string()),
        (
            "AccountEmail".to_string(),
            "aws+analytics-dev@example.com".to_string(),
        ),
        ("StackName".to_string(), "baseline-network".to_string()),
        ("StackRegion".to_string(), "eu-west-1".to_string()),
        ("SourceBucket".to_string(), "vending-templates".to_string()),
        ("BaselineTemplate".to_string(), "baseline.yaml".to_string()),
        ("BusinessUnit".to_string(), "analytics".to_string()),
        ("Environment".to_string(), "dev".to_string()),
    ]);
    for (tier, octet) in [("Public", 0), ("Private", 1), ("Data", 2)] {
        for (zone, index) in [("A", 0), ("B", 1), ("C", 2)] {
            env.insert(
                format!("{tier}Subnet{zone}Cidr"),
                format!("10.{octet}.{index}.0/24"),
            );
        }
    }
    env
}

pub fn config_from(env: &HashMap<String, String>) -> ProvisioningConfig {
    ProvisioningConfig::from_lookup(|name| env.get(name).cloned())
        .expect("sample environment should be valid")
}

pub fn sample_config() -> ProvisioningConfig {
    config_from(&sample_env())
}

pub struct FakeOrganizations {
    journal: CallJournal,
    create_status: CreateAccountStatus,
    create_error: Option<ProviderError>,
    describe_statuses: Mutex<Vec<Result<CreateAccountStatus, ProviderError>>>,
    units: Mutex<Vec<OrganizationalUnit>>,
    moves: Mutex<Vec<(String, String, String)>>,
    failing_moves: bool,
}

impl FakeOrganizations {
    /// Creation starts IN_PROGRESS and the first status poll reports
    /// SUCCEEDED with [`TEST_ACCOUNT_ID`].
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            create_status: account_status(AccountCreationState::InProgress, None),
            create_error: None,
            describe_statuses: Mutex::new(vec![Ok(account_status(
                AccountCreationState::Succeeded,
                Some(TEST_ACCOUNT_ID),
            ))]),
            units: Mutex::new(Vec::new()),
            moves: Mutex::new(Vec::new()),
            failing_moves: false,
        }
    }

    pub fn with_create_status(mut self, status: CreateAccountStatus) -> Self {
        self.create_status = status;
        self
    }

    pub fn failing_create(mut self, kind: ProviderErrorKind) -> Self {
        self.create_error = Some(ProviderError::new(kind, "CreateAccount rejected"));
        self
    }

    pub fn with_describe_statuses(
        self,
        statuses: Vec<Result<CreateAccountStatus, ProviderError>>,
    ) -> Self {
        *self.describe_statuses.lock().expect("poisoned mutex") = statuses;
        self
    }

    pub fn with_organizational_unit(self, unit: OrganizationalUnit) -> Self {
        self.units.lock().expect("poisoned mutex").push(unit);
        self
    }

    pub fn failing_moves(mut self) -> Self {
        self.failing_moves = true;
        self
    }

    pub fn organizational_units(&self) -> Vec<OrganizationalUnit> {
        self.units.lock().expect("poisoned mutex").clone()
    }

    pub fn moves(&self) -> Vec<(String, String, String)> {
        self.moves.lock().expect("poisoned mutex").clone()
    }
}

impl OrganizationsApi for FakeOrganizations {
    fn create_account(
        &self,
        request: &NewAccountRequest,
    ) -> Result<CreateAccountStatus, ProviderError> {
        self.journal
            .record(format!("organizations.create_account {}", request.email));
        match &self.create_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.create_status.clone()),
        }
    }

    fn describe_create_account_status(
        &self,
        request_id: &str,
    ) -> Result<CreateAccountStatus, ProviderError> {
        self.journal.record(format!(
            "organizations.describe_create_account_status {request_id}"
        ));
        take_or_repeat(&self.describe_statuses)
            .unwrap_or_else(|| Err(ProviderError::other("no status queued")))
    }

    fn root_id(&self) -> Result<String, ProviderError> {
        self.journal.record("organizations.list_roots");
        Ok("r-root".to_string())
    }

    fn list_organizational_units(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnit>, ProviderError> {
        self.journal.record(format!(
            "organizations.list_organizational_units_for_parent {parent_id}"
        ));
        Ok(self.organizational_units())
    }

    fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ProviderError> {
        self.journal.record(format!(
            "organizations.create_organizational_unit {parent_id} {name}"
        ));
        let mut units = self.units.lock().expect("poisoned mutex");
        let unit = OrganizationalUnit {
            id: format!("ou-root-{:04}", units.len() + 1),
            name: name.to_string(),
        };
        units.push(unit.clone());
        Ok(unit)
    }

    fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ProviderError> {
        self.journal.record(format!(
            "organizations.move_account {account_id} {destination_parent_id}"
        ));
        if self.failing_moves {
            return Err(ProviderError::new(
                ProviderErrorKind::NotFound,
                "DestinationParentNotFoundException",
            ));
        }
        self.moves.lock().expect("poisoned mutex").push((
            account_id.to_string(),
            source_parent_id.to_string(),
            destination_parent_id.to_string(),
        ));
        Ok(())
    }
}

pub struct FakeRoleAssumer {
    journal: CallJournal,
    remaining_failures: Mutex<u32>,
    failure_kind: ProviderErrorKind,
    requested_arns: Mutex<Vec<String>>,
}

impl FakeRoleAssumer {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            remaining_failures: Mutex::new(0),
            failure_kind: ProviderErrorKind::AccessDenied,
            requested_arns: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_times(mut self, failures: u32, kind: ProviderErrorKind) -> Self {
        self.remaining_failures = Mutex::new(failures);
        self.failure_kind = kind;
        self
    }

    pub fn attempts(&self) -> usize {
        self.requested_arns.lock().expect("poisoned mutex").len()
    }

    pub fn requested_arns(&self) -> Vec<String> {
        self.requested_arns.lock().expect("poisoned mutex").clone()
    }
}

impl RoleAssumer for FakeRoleAssumer {
    fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ProviderError> {
        self.journal
            .record(format!("sts.assume_role {role_arn} {session_name}"));
        self.requested_arns
            .lock()
            .expect("poisoned mutex")
            .push(role_arn.to_string());
        if consume_failure(&self.remaining_failures) {
            return Err(ProviderError::new(
                self.failure_kind,
                format!("not authorized to perform sts:AssumeRole on {role_arn}"),
            ));
        }
        Ok(sample_credentials())
    }
}

pub struct FakeTemplateStore {
    body: String,
}

impl FakeTemplateStore {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

impl TemplateStore for FakeTemplateStore {
    fn fetch_template(&self, _bucket: &str, _key: &str) -> Result<String, ProviderError> {
        Ok(self.body.clone())
    }
}

pub struct FakeStackDeployer {
    journal: CallJournal,
    events: Mutex<Vec<Option<StackEventRecord>>>,
    final_status: String,
    final_reason: Option<String>,
    remaining_failures: Mutex<u32>,
    failure_kind: ProviderErrorKind,
    submissions: Mutex<Vec<DeploymentRequest>>,
}

impl FakeStackDeployer {
    /// Without queued events the stack reports its final status as the
    /// latest event of the top-level stack resource.
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            events: Mutex::new(Vec::new()),
            final_status: "CREATE_COMPLETE".to_string(),
            final_reason: None,
            remaining_failures: Mutex::new(0),
            failure_kind: ProviderErrorKind::AccessDenied,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_events(self, events: Vec<Option<StackEventRecord>>) -> Self {
        *self.events.lock().expect("poisoned mutex") = events;
        self
    }

    pub fn with_final_status(mut self, status: &str, reason: Option<&str>) -> Self {
        self.final_status = status.to_string();
        self.final_reason = reason.map(str::to_string);
        self
    }

    pub fn failing_submissions(mut self, failures: u32, kind: ProviderErrorKind) -> Self {
        self.remaining_failures = Mutex::new(failures);
        self.failure_kind = kind;
        self
    }

    pub fn submissions(&self) -> Vec<DeploymentRequest> {
        self.submissions.lock().expect("poisoned mutex").clone()
    }
}

impl StackDeployer for FakeStackDeployer {
    fn create_stack(&self, request: &DeploymentRequest) -> Result<String, ProviderError> {
        self.journal
            .record(format!("stack.create_stack {}", request.stack_name));
        self.submissions
            .lock()
            .expect("poisoned mutex")
            .push(request.clone());
        if consume_failure(&self.remaining_failures) {
            return Err(ProviderError::new(
                self.failure_kind,
                "cloudformation:CreateStack denied",
            ));
        }
        Ok(stack_id(&request.region, &request.stack_name))
    }

    fn latest_stack_event(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackEventRecord>, ProviderError> {
        self.journal
            .record(format!("stack.latest_stack_event {stack_name}"));
        Ok(take_or_repeat(&self.events).unwrap_or_else(|| {
            Some(stack_event(stack_name, STACK_RESOURCE_TYPE, &self.final_status))
        }))
    }

    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError> {
        self.journal.record(format!("stack.describe_stack {stack_name}"));
        Ok(StackDescription {
            stack_id: stack_id("eu-west-1", stack_name),
            stack_name: stack_name.to_string(),
            stack_status: self.final_status.clone(),
            stack_status_reason: self.final_reason.clone(),
            outputs: [("VpcId".to_string(), "vpc-baseline".to_string())].into(),
        })
    }
}

fn stack_id(region: &str, stack_name: &str) -> String {
    format!("arn:aws:cloudformation:{region}:{TEST_ACCOUNT_ID}:stack/{stack_name}/0001")
}

struct FakeVpc {
    id: String,
    gateways: Vec<String>,
    subnets: Vec<String>,
}

pub struct FakeNetworkCleaner {
    journal: CallJournal,
    region: String,
    vpcs: Vec<FakeVpc>,
    failing_vpc_deletion: bool,
}

impl FakeNetworkCleaner {
    pub fn new(journal: CallJournal, region: &str) -> Self {
        Self {
            journal,
            region: region.to_string(),
            vpcs: Vec::new(),
            failing_vpc_deletion: false,
        }
    }

    pub fn with_default_vpc(mut self, vpc_id: &str, gateways: &[&str], subnets: &[&str]) -> Self {
        self.vpcs.push(FakeVpc {
            id: vpc_id.to_string(),
            gateways: gateways.iter().map(|id| id.to_string()).collect(),
            subnets: subnets.iter().map(|id| id.to_string()).collect(),
        });
        self
    }

    pub fn failing_vpc_deletion(mut self) -> Self {
        self.failing_vpc_deletion = true;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn record(&self, call: String) {
        self.journal.record(format!("ec2[{}].{call}", self.region));
    }

    fn vpc(&self, vpc_id: &str) -> Option<&FakeVpc> {
        self.vpcs.iter().find(|vpc| vpc.id == vpc_id)
    }
}

impl NetworkCleaner for FakeNetworkCleaner {
    fn default_vpc_ids(&self) -> Result<Vec<String>, ProviderError> {
        self.record("describe_vpcs".to_string());
        Ok(self.vpcs.iter().map(|vpc| vpc.id.clone()).collect())
    }

    fn internet_gateway_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .vpc(vpc_id)
            .map(|vpc| vpc.gateways.clone())
            .unwrap_or_default())
    }

    fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), ProviderError> {
        self.record(format!("detach_internet_gateway {gateway_id} {vpc_id}"));
        Ok(())
    }

    fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_internet_gateway {gateway_id}"));
        Ok(())
    }

    fn subnet_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .vpc(vpc_id)
            .map(|vpc| vpc.subnets.clone())
            .unwrap_or_default())
    }

    fn delete_subnet(&self, subnet_id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_subnet {subnet_id}"));
        Ok(())
    }

    fn delete_vpc(&self, vpc_id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_vpc {vpc_id}"));
        if self.failing_vpc_deletion {
            return Err(ProviderError::other(format!(
                "DependencyViolation: {vpc_id} has dependencies"
            )));
        }
        Ok(())
    }
}

pub struct FakeConnector {
    journal: CallJournal,
    deployer: FakeStackDeployer,
    networks: Vec<FakeNetworkCleaner>,
    connections: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            deployer: FakeStackDeployer::new(journal.clone()),
            journal,
            networks: Vec::new(),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn with_deployer(mut self, deployer: FakeStackDeployer) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn with_network(mut self, cleaner: FakeNetworkCleaner) -> Self {
        self.networks.push(cleaner);
        self
    }

    pub fn deployer(&self) -> &FakeStackDeployer {
        &self.deployer
    }

    /// `"{service} {region} {access_key_id}"` for every client handed out.
    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().expect("poisoned mutex").clone()
    }

    fn connect(&self, service: &str, credentials: &TemporaryCredentials, region: &str) {
        self.connections
            .lock()
            .expect("poisoned mutex")
            .push(format!("{service} {region} {}", credentials.access_key_id));
    }
}

impl MemberAccountConnector for FakeConnector {
    fn stack_deployer<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn StackDeployer + 'a> {
        self.connect("cloudformation", credentials, region);
        Box::new(&self.deployer)
    }

    fn network_cleaner<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn NetworkCleaner + 'a> {
        self.connect("ec2", credentials, region);
        match self.networks.iter().find(|cleaner| cleaner.region() == region) {
            Some(cleaner) => Box::new(cleaner),
            None => Box::new(FakeNetworkCleaner::new(self.journal.clone(), region)),
        }
    }
}

pub struct RecordingCallback {
    journal: CallJournal,
    sent: Mutex<Vec<(String, CallbackResponse)>>,
    failing: bool,
}

impl RecordingCallback {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            sent: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn sent(&self) -> Vec<(String, CallbackResponse)> {
        self.sent.lock().expect("poisoned mutex").clone()
    }
}

impl CallbackSender for RecordingCallback {
    fn put_response(&self, response_url: &str, body: &str) -> Result<(), ProviderError> {
        let response: CallbackResponse =
            serde_json::from_str(body).expect("callback body should be a response document");
        let status = serde_json::to_value(response.status).expect("status should serialize");
        self.journal.record(format!(
            "callback.put_response {}",
            status.as_str().unwrap_or_default()
        ));
        self.sent
            .lock()
            .expect("poisoned mutex")
            .push((response_url.to_string(), response));
        if self.failing {
            return Err(ProviderError::new(
                ProviderErrorKind::Unavailable,
                "response URL unreachable",
            ));
        }
        Ok(())
    }
}

pub struct RecordingFunctionRemover {
    journal: CallJournal,
    failing: bool,
}

impl RecordingFunctionRemover {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            failing: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl FunctionRemover for RecordingFunctionRemover {
    fn delete_function(&self, function_name: &str) -> Result<(), ProviderError> {
        self.journal
            .record(format!("lambda.delete_function {function_name}"));
        if self.failing {
            return Err(ProviderError::new(
                ProviderErrorKind::AccessDenied,
                "lambda:DeleteFunction denied",
            ));
        }
        Ok(())
    }
}

/// One fake per service, all writing to `journal`. Fields are public so a
/// test can swap in a differently configured fake before calling
/// [`FakeProvider::services`].
pub struct FakeProvider {
    pub journal: CallJournal,
    pub organizations: FakeOrganizations,
    pub roles: FakeRoleAssumer,
    pub templates: FakeTemplateStore,
    pub connector: FakeConnector,
    pub callback: RecordingCallback,
    pub functions: RecordingFunctionRemover,
    pub sleeper: RecordingSleeper,
}

impl FakeProvider {
    pub fn succeeding() -> Self {
        let journal = CallJournal::default();
        Self {
            organizations: FakeOrganizations::new(journal.clone()),
            roles: FakeRoleAssumer::new(journal.clone()),
            templates: FakeTemplateStore::new("AWSTemplateFormatVersion: '2010-09-09'\n"),
            connector: FakeConnector::new(journal.clone()),
            callback: RecordingCallback::new(journal.clone()),
            functions: RecordingFunctionRemover::new(journal.clone()),
            sleeper: RecordingSleeper::default(),
            journal,
        }
    }

    pub fn services(&self) -> ProviderServices<'_> {
        ProviderServices {
            organizations: &self.organizations,
            roles: &self.roles,
            templates: &self.templates,
            member_accounts: &self.connector,
            callback: &self.callback,
            functions: &self.functions,
            sleeper: &self.sleeper,
        }
    }
}
