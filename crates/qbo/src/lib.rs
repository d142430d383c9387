//! Minimal QuickBooks Online SDK: OAuth token lifecycle plus paginated,
//! retrying query access for the entity types the sync engine replicates.

pub mod client;
pub mod error;
pub mod models;
pub mod token;

pub use client::{QboClient, QboClientConfig, QboEnvironment, QueryPager};
pub use error::QboError;
pub use token::{exchange_authorization_code, OauthConfig, QboCredentials, TokenUpdate};
