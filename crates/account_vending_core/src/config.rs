//! Provisioning configuration read once from the Lambda environment.

use std::time::Duration;

use thiserror::Error;

use crate::account::{NewAccountRequest, DEFAULT_ACCOUNT_ROLE};
use crate::retry::RetryPolicy;
use crate::stack::StackParameter;

pub const ACCOUNT_NAME_VAR: &str = "AccountName";
pub const ACCOUNT_EMAIL_VAR: &str = "AccountEmail";
pub const ACCOUNT_ROLE_VAR: &str = "AccountRoleName";
pub const ORGANIZATIONAL_UNIT_VAR: &str = "OrganizationalUnitName";
pub const STACK_NAME_VAR: &str = "StackName";
pub const STACK_REGION_VAR: &str = "StackRegion";
pub const TEMPLATE_BUCKET_VAR: &str = "SourceBucket";
pub const TEMPLATE_KEY_VAR: &str = "BaselineTemplate";
pub const CLEANUP_REGIONS_VAR: &str = "DefaultVpcCleanupRegions";
pub const RETRY_MAX_ATTEMPTS_VAR: &str = "RetryMaxAttempts";
pub const RETRY_MAX_WAIT_VAR: &str = "RetryMaxWaitSeconds";
pub const POLL_MAX_WAIT_VAR: &str = "PollMaxWaitSeconds";
pub const UNBOUNDED_WAITS_VAR: &str = "UnboundedWaits";

/// Baseline template parameters, passed through under the same names.
pub const STACK_PARAMETER_NAMES: [&str; 11] = [
    "BusinessUnit",
    "Environment",
    "PublicSubnetACidr",
    "PublicSubnetBCidr",
    "PublicSubnetCCidr",
    "PrivateSubnetACidr",
    "PrivateSubnetBCidr",
    "PrivateSubnetCCidr",
    "DataSubnetACidr",
    "DataSubnetBCidr",
    "DataSubnetCCidr",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(String),
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicies {
    pub account_status: RetryPolicy,
    pub account_id: RetryPolicy,
    pub role_assumption: RetryPolicy,
    pub stack_submission: RetryPolicy,
    pub stack_events: RetryPolicy,
}

/// Lambda rejects timeouts above this, so the default waits must fit inside it.
pub const LAMBDA_MAX_TIMEOUT: Duration = Duration::from_secs(900);

impl Default for WaitPolicies {
    fn default() -> Self {
        Self {
            account_status: RetryPolicy::fixed(Duration::from_secs(10))
                .with_max_total_wait(Duration::from_secs(240)),
            account_id: RetryPolicy::fixed(Duration::from_secs(10))
                .with_max_total_wait(Duration::from_secs(60)),
            role_assumption: RetryPolicy::exponential(
                Duration::from_secs(10),
                Duration::from_secs(60),
            )
            .with_max_attempts(20)
            .with_max_total_wait(Duration::from_secs(120)),
            stack_submission: RetryPolicy::exponential(
                Duration::from_secs(10),
                Duration::from_secs(60),
            )
            .with_max_attempts(10)
            .with_max_total_wait(Duration::from_secs(60)),
            stack_events: RetryPolicy::fixed(Duration::from_secs(10))
                .with_max_total_wait(Duration::from_secs(300)),
        }
    }
}

impl WaitPolicies {
    /// Removes every limit: loops stop only on success or a Lambda timeout.
    pub fn unbounded(self) -> Self {
        Self {
            account_status: self.account_status.without_limits(),
            account_id: self.account_id.without_limits(),
            role_assumption: self.role_assumption.without_limits(),
            stack_submission: self.stack_submission.without_limits(),
            stack_events: self.stack_events.without_limits(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    pub account_name: String,
    pub account_email: String,
    pub account_role_name: String,
    pub organizational_unit_name: Option<String>,
    pub stack_name: String,
    pub stack_region: String,
    pub template_bucket: String,
    pub template_key: String,
    pub stack_parameters: Vec<StackParameter>,
    pub cleanup_regions: Vec<String>,
    pub wait_policies: WaitPolicies,
}

impl ProvisioningConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required =
            |name: &str| optional(name).ok_or_else(|| ConfigError::Missing(name.to_string()));

        let stack_parameters = STACK_PARAMETER_NAMES
            .iter()
            .map(|&name| {
                required(name).map(|value| StackParameter {
                    key: name.to_string(),
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cleanup_regions = optional(CLEANUP_REGIONS_VAR)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|region| !region.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let wait_policies = resolve_wait_policies(&optional)?;

        Ok(Self {
            account_name: required(ACCOUNT_NAME_VAR)?,
            account_email: required(ACCOUNT_EMAIL_VAR)?,
            account_role_name: optional(ACCOUNT_ROLE_VAR)
                .unwrap_or_else(|| DEFAULT_ACCOUNT_ROLE.to_string()),
            organizational_unit_name: optional(ORGANIZATIONAL_UNIT_VAR),
            stack_name: required(STACK_NAME_VAR)?,
            stack_region: required(STACK_REGION_VAR)?,
            template_bucket: required(TEMPLATE_BUCKET_VAR)?,
            template_key: required(TEMPLATE_KEY_VAR)?,
            stack_parameters,
            cleanup_regions,
            wait_policies,
        })
    }

    pub fn new_account_request(&self) -> NewAccountRequest {
        NewAccountRequest {
            email: self.account_email.clone(),
            account_name: self.account_name.clone(),
            role_name: self.account_role_name.clone(),
        }
    }
}

fn resolve_wait_policies(
    optional: &impl Fn(&str) -> Option<String>,
) -> Result<WaitPolicies, ConfigError> {
    let mut policies = WaitPolicies::default();

    if let Some(attempts) = parse_positive(optional, RETRY_MAX_ATTEMPTS_VAR)? {
        let attempts = u32::try_from(attempts).map_err(|_| ConfigError::Invalid {
            name: RETRY_MAX_ATTEMPTS_VAR.to_string(),
            value: attempts.to_string(),
            reason: "too large".to_string(),
        })?;
        policies.role_assumption = policies.role_assumption.with_max_attempts(attempts);
        policies.stack_submission = policies.stack_submission.with_max_attempts(attempts);
    }

    if let Some(seconds) = parse_positive(optional, RETRY_MAX_WAIT_VAR)? {
        let budget = Duration::from_secs(seconds);
        policies.role_assumption = policies.role_assumption.with_max_total_wait(budget);
        policies.stack_submission = policies.stack_submission.with_max_total_wait(budget);
    }

    if let Some(seconds) = parse_positive(optional, POLL_MAX_WAIT_VAR)? {
        let budget = Duration::from_secs(seconds);
        policies.account_status = policies.account_status.with_max_total_wait(budget);
        policies.account_id = policies.account_id.with_max_total_wait(budget);
        policies.stack_events = policies.stack_events.with_max_total_wait(budget);
    }

    match optional(UNBOUNDED_WAITS_VAR) {
        None => Ok(policies),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" => Ok(policies.unbounded()),
            "false" => Ok(policies),
            _ => Err(ConfigError::Invalid {
                name: UNBOUNDED_WAITS_VAR.to_string(),
                value,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

fn parse_positive(
    optional: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = optional(name) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            name: name.to_string(),
            value,
            reason: "expected a positive integer".to_string(),
        }),
        Ok(parsed) => Ok(Some(parsed)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<String, String> {
        let mut env = HashMap::from([
            (ACCOUNT_NAME_VAR.to_string(), "analytics-dev".to_string()),
            (
                ACCOUNT_EMAIL_VAR.to_string(),
                "aws+analytics-dev@example.com".to_string(),
            ),
            (STACK_NAME_VAR.to_string(), "baseline-network".to_string()),
            (STACK_REGION_VAR.to_string(), "eu-west-1".to_string()),
            (TEMPLATE_BUCKET_VAR.to_string(), "vending-templates".to_string()),
            (TEMPLATE_KEY_VAR.to_string(), "baseline.yaml".to_string()),
        ]);
        for (index, name) in STACK_PARAMETER_NAMES.iter().enumerate() {
            env.insert((*name).to_string(), format!("10.0.{index}.0/24"));
        }
        env
    }

    fn load(env: &HashMap<String, String>) -> Result<ProvisioningConfig, ConfigError> {
        ProvisioningConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let config = load(&base_env()).expect("config should load");

        assert_eq!(config.account_role_name, DEFAULT_ACCOUNT_ROLE);
        assert_eq!(config.organizational_unit_name, None);
        assert!(config.cleanup_regions.is_empty());
        assert_eq!(config.wait_policies, WaitPolicies::default());
        assert_eq!(config.stack_parameters.len(), STACK_PARAMETER_NAMES.len());
        assert_eq!(config.stack_parameters[0].key, "BusinessUnit");
        assert_eq!(config.stack_parameters[0].value, "10.0.0.0/24");
        assert_eq!(
            config.new_account_request().email,
            "aws+analytics-dev@example.com"
        );
    }

    #[test]
    fn default_waits_fit_one_invocation() {
        let policies = WaitPolicies::default();
        let total: Duration = [
            policies.account_status,
            policies.account_id,
            policies.role_assumption,
            policies.stack_submission,
            policies.stack_events,
        ]
        .iter()
        .map(|policy| policy.max_total_wait().expect("default waits are bounded"))
        .sum();

        assert!(total <= Duration::from_secs(780), "{total:?}");
        assert!(total < LAMBDA_MAX_TIMEOUT);
    }

    #[test]
    fn reports_missing_variable_by_name() {
        let mut env = base_env();
        env.remove("DataSubnetBCidr");

        assert_eq!(
            load(&env).expect_err("config should fail"),
            ConfigError::Missing("DataSubnetBCidr".to_string())
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = base_env();
        env.insert(ACCOUNT_EMAIL_VAR.to_string(), "   ".to_string());

        let error = load(&env).expect_err("config should fail");
        assert_eq!(error.to_string(), "AccountEmail must be configured");
    }

    #[test]
    fn parses_optional_placement_and_cleanup_regions() {
        let mut env = base_env();
        env.insert(ORGANIZATIONAL_UNIT_VAR.to_string(), "Workloads".to_string());
        env.insert(
            CLEANUP_REGIONS_VAR.to_string(),
            "eu-west-1, us-east-1,,".to_string(),
        );

        let config = load(&env).expect("config should load");
        assert_eq!(config.organizational_unit_name.as_deref(), Some("Workloads"));
        assert_eq!(config.cleanup_regions, vec!["eu-west-1", "us-east-1"]);
    }

    #[test]
    fn applies_wait_overrides() {
        let mut env = base_env();
        env.insert(RETRY_MAX_ATTEMPTS_VAR.to_string(), "3".to_string());
        env.insert(POLL_MAX_WAIT_VAR.to_string(), "120".to_string());

        let policies = load(&env).expect("config should load").wait_policies;
        assert_eq!(policies.role_assumption.max_attempts(), Some(3));
        assert_eq!(policies.stack_submission.max_attempts(), Some(3));
        assert_eq!(
            policies.stack_events.max_total_wait(),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn unbounded_waits_remove_every_limit() {
        let mut env = base_env();
        env.insert(UNBOUNDED_WAITS_VAR.to_string(), "TRUE".to_string());

        let policies = load(&env).expect("config should load").wait_policies;
        assert!(!policies.role_assumption.is_bounded());
        assert!(!policies.account_status.is_bounded());
        assert!(!policies.stack_events.is_bounded());
    }

    #[test]
    fn rejects_non_numeric_override() {
        let mut env = base_env();
        env.insert(RETRY_MAX_WAIT_VAR.to_string(), "soon".to_string());

        let error = load(&env).expect_err("config should fail");
        assert!(matches!(error, ConfigError::Invalid { ref name, .. } if name == RETRY_MAX_WAIT_VAR));
    }
}
