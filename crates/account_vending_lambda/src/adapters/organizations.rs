use account_vending_core::account::{CreateAccountStatus, NewAccountRequest, OrganizationalUnit};

use crate::error::ProviderError;

pub trait OrganizationsApi {
    fn create_account(&self, request: &NewAccountRequest)
        -> Result<CreateAccountStatus, ProviderError>;

    fn describe_create_account_status(
        &self,
        request_id: &str,
    ) -> Result<CreateAccountStatus, ProviderError>;

    fn root_id(&self) -> Result<String, ProviderError>;

    /// All organizational units directly under `parent_id`, across pages.
    fn list_organizational_units(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnit>, ProviderError>;

    fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ProviderError>;

    fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ProviderError>;
}
