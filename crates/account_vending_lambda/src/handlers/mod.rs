pub mod account;
pub mod credentials;
pub mod deployment;
pub mod lifecycle;
pub mod network;
pub mod notify;
pub mod placement;
pub mod retry;
