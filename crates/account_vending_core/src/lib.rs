//! Shared account vending domain primitives.
//!
//! This crate owns the custom-resource contract, configuration, wait policies,
//! and the account and stack models. It intentionally excludes AWS SDK and
//! Lambda runtime concerns.

pub mod account;
pub mod config;
pub mod contract;
pub mod retry;
pub mod stack;
