//! An OpenID Connect / OAuth2 identity provider.
//!
//! Authenticates end users, issues single-use authorization codes and
//! rotating refresh tokens, and mints RS256 ID and access tokens that relying
//! parties verify against the published JWKS.

pub mod account;
pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod health;
pub mod keys;
pub mod oidc;
pub mod openapi;
pub mod password;
pub mod seed;
pub mod server;
pub mod store;
