//! AWS-oriented adapters and handlers for the account vending custom resource.
//!
//! Handlers are plain synchronous procedures written against the adapter
//! traits; the `account_vending` binary supplies SDK-backed implementations
//! and drives them from the Lambda runtime.

pub mod adapters;
pub mod error;
pub mod handlers;
pub mod telemetry;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
