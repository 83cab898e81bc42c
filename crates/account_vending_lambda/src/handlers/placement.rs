use tracing::info;

use crate::adapters::organizations::OrganizationsApi;
use crate::error::ProvisioningError;

/// Returns the id of the OU named `name` under `parent_id`, creating it when
/// absent.
pub fn resolve_organizational_unit(
    organizations: &dyn OrganizationsApi,
    parent_id: &str,
    name: &str,
) -> Result<String, ProvisioningError> {
    let existing = organizations
        .list_organizational_units(parent_id)?
        .into_iter()
        .find(|unit| unit.name == name);

    if let Some(unit) = existing {
        info!(
            component = "organizational_placement",
            event = "organizational_unit_found",
            name = %name,
            organizational_unit_id = %unit.id
        );
        return Ok(unit.id);
    }

    let created = organizations.create_organizational_unit(parent_id, name)?;
    info!(
        component = "organizational_placement",
        event = "organizational_unit_created",
        name = %name,
        organizational_unit_id = %created.id
    );
    Ok(created.id)
}

/// Moves the account from the root into the named OU and returns the OU id.
pub fn place_account(
    organizations: &dyn OrganizationsApi,
    account_id: &str,
    organizational_unit_name: &str,
) -> Result<String, ProvisioningError> {
    let root_id = organizations.root_id()?;
    let organizational_unit_id =
        resolve_organizational_unit(organizations, &root_id, organizational_unit_name)?;
    organizations.move_account(account_id, &root_id, &organizational_unit_id)?;
    info!(
        component = "organizational_placement",
        event = "account_moved",
        account_id = %account_id,
        organizational_unit_id = %organizational_unit_id
    );
    Ok(organizational_unit_id)
}
