use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::adapters::credentials::TemporaryCredentials;
use crate::adapters::deployment::MemberAccountConnector;
use crate::adapters::network::NetworkCleaner;
use crate::error::ProviderError;

/// Deletes every default VPC visible to `cleaner`. Gateways are detached and
/// deleted and subnets removed before the VPC itself.
pub fn remove_default_vpcs(cleaner: &dyn NetworkCleaner) -> Result<Vec<String>, ProviderError> {
    let mut removed = Vec::new();
    for vpc_id in cleaner.default_vpc_ids()? {
        for gateway_id in cleaner.internet_gateway_ids(&vpc_id)? {
            cleaner.detach_internet_gateway(&gateway_id, &vpc_id)?;
            cleaner.delete_internet_gateway(&gateway_id)?;
        }
        for subnet_id in cleaner.subnet_ids(&vpc_id)? {
            cleaner.delete_subnet(&subnet_id)?;
        }
        cleaner.delete_vpc(&vpc_id)?;
        removed.push(vpc_id);
    }
    Ok(removed)
}

/// Best-effort cleanup across `regions`; a failing region is logged and
/// skipped. Returns the removed VPC ids per region.
pub fn clean_default_networks(
    connector: &dyn MemberAccountConnector,
    credentials: &TemporaryCredentials,
    regions: &[String],
) -> BTreeMap<String, Vec<String>> {
    let mut removed_by_region = BTreeMap::new();
    for region in regions {
        let cleaner = connector.network_cleaner(credentials, region);
        match remove_default_vpcs(&*cleaner) {
            Ok(removed) => {
                info!(
                    component = "network_cleaner",
                    event = "default_vpcs_removed",
                    region = %region,
                    vpc_count = removed.len()
                );
                removed_by_region.insert(region.clone(), removed);
            }
            Err(error) => {
                warn!(
                    component = "network_cleaner",
                    event = "default_vpc_cleanup_failed",
                    region = %region,
                    error = %error
                );
            }
        }
    }
    removed_by_region
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_credentials, CallJournal, FakeConnector, FakeNetworkCleaner};

    #[test]
    fn removes_dependencies_before_the_vpc() {
        let journal = CallJournal::default();
        let cleaner = FakeNetworkCleaner::new(journal.clone(), "eu-west-1")
            .with_default_vpc("vpc-1", &["igw-1"], &["subnet-a", "subnet-b"]);

        let removed = remove_default_vpcs(&cleaner).expect("cleanup should succeed");

        assert_eq!(removed, vec!["vpc-1"]);
        assert_eq!(
            journal.entries(),
            vec![
                "ec2[eu-west-1].describe_vpcs",
                "ec2[eu-west-1].detach_internet_gateway igw-1 vpc-1",
                "ec2[eu-west-1].delete_internet_gateway igw-1",
                "ec2[eu-west-1].delete_subnet subnet-a",
                "ec2[eu-west-1].delete_subnet subnet-b",
                "ec2[eu-west-1].delete_vpc vpc-1",
            ]
        );
    }

    #[test]
    fn failing_region_does_not_stop_others() {
        let journal = CallJournal::default();
        let connector = FakeConnector::new(journal.clone())
            .with_network(
                FakeNetworkCleaner::new(journal.clone(), "us-east-1")
                    .with_default_vpc("vpc-east", &[], &["subnet-e"])
                    .failing_vpc_deletion(),
            )
            .with_network(
                FakeNetworkCleaner::new(journal.clone(), "eu-west-1")
                    .with_default_vpc("vpc-west", &["igw-w"], &[]),
            );

        let removed = clean_default_networks(
            &connector,
            &sample_credentials(),
            &["us-east-1".to_string(), "eu-west-1".to_string()],
        );

        assert!(!removed.contains_key("us-east-1"));
        assert_eq!(removed.get("eu-west-1"), Some(&vec!["vpc-west".to_string()]));
    }
}
