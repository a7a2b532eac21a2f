//! Redirection engine
//!
//! Implements the redirection API on top of the provider gateway.

pub mod api;
pub mod utils;
pub mod validation;

pub use api::{NeutronSfcRedirectionApi, RedirectionApiFactory};
pub use utils::RedirectionUtils;
