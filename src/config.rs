//! Engine configuration
//!
//! Loaded from an optional YAML file; the CLI overrides individual fields
//! from flags and environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Binding-profile key holding the hook id on an inspected port
pub const DEFAULT_HOOK_TAG_KEY: &str = "sfc_inspection_hook_id";

/// Which transport the engine talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Neutron REST API
    #[default]
    Neutron,
    /// Process-local store, for dry runs
    Memory,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Neutron => write!(f, "neutron"),
            ProviderKind::Memory => write!(f, "memory"),
        }
    }
}

/// Neutron and Keystone connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutronConfig {
    /// Neutron network endpoint, e.g. `http://controller:9696`
    pub network_endpoint: String,
    /// Keystone v3 auth URL
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    pub region: String,
    /// Pre-issued token; skips Keystone authentication when set
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for NeutronConfig {
    fn default() -> Self {
        Self {
            network_endpoint: "http://neutron:9696".to_string(),
            auth_url: "http://keystone:5000/v3".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            project_name: "admin".to_string(),
            user_domain_name: "Default".to_string(),
            project_domain_name: "Default".to_string(),
            region: "RegionOne".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectionConfig {
    pub provider: ProviderKind,
    pub neutron: NeutronConfig,
    pub hook_tag_key: String,
}

impl Default for RedirectionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            neutron: NeutronConfig::default(),
            hook_tag_key: DEFAULT_HOOK_TAG_KEY.to_string(),
        }
    }
}

impl RedirectionConfig {
    /// Load a configuration file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hook_tag_key.trim().is_empty() {
            return Err(Error::Configuration("hook tag key must not be empty".into()));
        }

        if self.provider == ProviderKind::Neutron {
            let neutron = &self.neutron;
            if neutron.network_endpoint.trim().is_empty() {
                return Err(Error::Configuration("Neutron network endpoint is required".into()));
            }
            if neutron.request_timeout_secs == 0 {
                return Err(Error::Configuration("request timeout must be positive".into()));
            }
            if neutron.token.is_none() && (neutron.auth_url.is_empty() || neutron.username.is_empty()) {
                return Err(Error::Configuration(
                    "either a token or Keystone auth URL and username are required".into(),
                ));
            }
        }
        Ok(())
    }
}
