pub mod callback;
pub mod credentials;
pub mod deployment;
pub mod function;
pub mod network;
pub mod organizations;
pub mod sleep;
pub mod templates;
