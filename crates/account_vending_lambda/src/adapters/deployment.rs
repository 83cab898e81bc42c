use account_vending_core::stack::{DeploymentRequest, StackDescription, StackEventRecord};

use crate::adapters::credentials::TemporaryCredentials;
use crate::adapters::network::NetworkCleaner;
use crate::error::ProviderError;

pub trait StackDeployer {
    /// Submits the stack and returns its id.
    fn create_stack(&self, request: &DeploymentRequest) -> Result<String, ProviderError>;

    /// Most recent event of the stack, if any has been recorded yet.
    fn latest_stack_event(&self, stack_name: &str)
        -> Result<Option<StackEventRecord>, ProviderError>;

    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError>;
}

impl<T: StackDeployer + ?Sized> StackDeployer for &T {
    fn create_stack(&self, request: &DeploymentRequest) -> Result<String, ProviderError> {
        (**self).create_stack(request)
    }

    fn latest_stack_event(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackEventRecord>, ProviderError> {
        (**self).latest_stack_event(stack_name)
    }

    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError> {
        (**self).describe_stack(stack_name)
    }
}

/// Builds clients scoped to the new member account.
pub trait MemberAccountConnector {
    fn stack_deployer<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn StackDeployer + 'a>;

    fn network_cleaner<'a>(
        &'a self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Box<dyn NetworkCleaner + 'a>;
}
