use crate::error::ProviderError;

/// EC2 operations needed to remove a default VPC in one region of a member
/// account.
pub trait NetworkCleaner {
    fn default_vpc_ids(&self) -> Result<Vec<String>, ProviderError>;

    fn internet_gateway_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError>;

    fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str)
        -> Result<(), ProviderError>;

    fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), ProviderError>;

    fn subnet_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError>;

    fn delete_subnet(&self, subnet_id: &str) -> Result<(), ProviderError>;

    fn delete_vpc(&self, vpc_id: &str) -> Result<(), ProviderError>;
}

impl<T: NetworkCleaner + ?Sized> NetworkCleaner for &T {
    fn default_vpc_ids(&self) -> Result<Vec<String>, ProviderError> {
        (**self).default_vpc_ids()
    }

    fn internet_gateway_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        (**self).internet_gateway_ids(vpc_id)
    }

    fn detach_internet_gateway(
        &self,
        gateway_id: &str,
        vpc_id: &str,
    ) -> Result<(), ProviderError> {
        (**self).detach_internet_gateway(gateway_id, vpc_id)
    }

    fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), ProviderError> {
        (**self).delete_internet_gateway(gateway_id)
    }

    fn subnet_ids(&self, vpc_id: &str) -> Result<Vec<String>, ProviderError> {
        (**self).subnet_ids(vpc_id)
    }

    fn delete_subnet(&self, subnet_id: &str) -> Result<(), ProviderError> {
        (**self).delete_subnet(subnet_id)
    }

    fn delete_vpc(&self, vpc_id: &str) -> Result<(), ProviderError> {
        (**self).delete_vpc(vpc_id)
    }
}
