//! SeaORM entities for the identity provider.

pub mod audit_event;
pub mod authorization_code;
pub mod client;
pub mod refresh_token;
pub mod user;
