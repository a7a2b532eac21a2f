//! Neutron resources the engine reads and writes
//!
//! Field names follow the Neutron JSON schema. Server-owned fields are
//! `Option`s skipped on serialization so that clearing them removes them from
//! create/update payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Resource Kind
// =============================================================================

/// The five remote resource kinds the engine depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Port,
    PortPair,
    PortPairGroup,
    PortChain,
    FlowClassifier,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Port,
        ResourceKind::PortPair,
        ResourceKind::PortPairGroup,
        ResourceKind::PortChain,
        ResourceKind::FlowClassifier,
    ];

    /// Human-readable name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Port => "Port",
            ResourceKind::PortPair => "Port Pair",
            ResourceKind::PortPairGroup => "Port Pair Group",
            ResourceKind::PortChain => "Port Chain",
            ResourceKind::FlowClassifier => "Flow Classifier",
        }
    }

    /// JSON envelope key of a single resource
    pub fn singular_key(&self) -> &'static str {
        match self {
            ResourceKind::Port => "port",
            ResourceKind::PortPair => "port_pair",
            ResourceKind::PortPairGroup => "port_pair_group",
            ResourceKind::PortChain => "port_chain",
            ResourceKind::FlowClassifier => "flow_classifier",
        }
    }

    /// JSON envelope key of a collection
    pub fn collection_key(&self) -> &'static str {
        match self {
            ResourceKind::Port => "ports",
            ResourceKind::PortPair => "port_pairs",
            ResourceKind::PortPairGroup => "port_pair_groups",
            ResourceKind::PortChain => "port_chains",
            ResourceKind::FlowClassifier => "flow_classifiers",
        }
    }

    /// Collection path relative to the network endpoint
    pub fn collection_path(&self) -> &'static str {
        match self {
            ResourceKind::Port => "/v2.0/ports",
            ResourceKind::PortPair => "/v2.0/sfc/port_pairs",
            ResourceKind::PortPairGroup => "/v2.0/sfc/port_pair_groups",
            ResourceKind::PortChain => "/v2.0/sfc/port_chains",
            ResourceKind::FlowClassifier => "/v2.0/sfc/flow_classifiers",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// =============================================================================
// Resource Trait
// =============================================================================

/// A typed remote resource
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: ResourceKind;

    fn id(&self) -> Option<&str>;

    /// Remove the identity and every field the server computes
    fn clear_server_fields(&mut self);
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Port
// =============================================================================

/// Fixed IP assignment of a port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    pub ip_address: String,
}

/// Neutron port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Binding profile, also used to tag the port with its inspection hook
    #[serde(
        rename = "binding:profile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub profile: Option<BTreeMap<String, Value>>,
}

impl Port {
    pub fn profile_value(&self, key: &str) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
    }

    pub fn ip_addresses(&self) -> impl Iterator<Item = &str> {
        self.fixed_ips.iter().map(|ip| ip.ip_address.as_str())
    }
}

impl Resource for Port {
    const KIND: ResourceKind = ResourceKind::Port;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn clear_server_fields(&mut self) {
        self.id = None;
        self.project_id = None;
        self.tenant_id = None;
        self.status = None;
    }
}

/// Server-side filter for port listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub device_id: Option<String>,
    pub device_owner: Option<String>,
    pub network_id: Option<String>,
    pub project_id: Option<String>,
}

impl PortFilter {
    pub fn by_ip_address(ip: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip.into()),
            ..Default::default()
        }
    }

    /// Neutron query parameters for this filter
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(ip) = &self.ip_address {
            query.push(("fixed_ips".to_string(), format!("ip_address={}", ip)));
        }
        let fields = [
            ("mac_address", &self.mac_address),
            ("device_id", &self.device_id),
            ("device_owner", &self.device_owner),
            ("network_id", &self.network_id),
            ("project_id", &self.project_id),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                query.push((key.to_string(), v.clone()));
            }
        }
        query
    }
}

// =============================================================================
// SFC Resources
// =============================================================================

/// Neutron SFC port pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_function_parameters: Option<BTreeMap<String, Value>>,
}

impl Resource for PortPair {
    const KIND: ResourceKind = ResourceKind::PortPair;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn clear_server_fields(&mut self) {
        self.id = None;
        self.project_id = None;
        self.tenant_id = None;
    }
}

/// Neutron SFC port pair group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortPairGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub port_pairs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_pair_group_parameters: Option<BTreeMap<String, Value>>,
}

impl Resource for PortPairGroup {
    const KIND: ResourceKind = ResourceKind::PortPairGroup;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn clear_server_fields(&mut self) {
        self.id = None;
        self.project_id = None;
        self.tenant_id = None;
        self.port_pair_group_parameters = None;
    }
}

/// Neutron SFC port chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub port_pair_groups: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flow_classifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_parameters: Option<BTreeMap<String, Value>>,
}

impl Resource for PortChain {
    const KIND: ResourceKind = ResourceKind::PortChain;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn clear_server_fields(&mut self) {
        self.id = None;
        self.project_id = None;
        self.tenant_id = None;
        self.chain_id = None;
        self.chain_parameters = None;
    }
}

/// Neutron SFC flow classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowClassifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethertype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_destination_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l7_parameters: Option<BTreeMap<String, Value>>,
}

impl FlowClassifier {
    /// Address part of the destination prefix
    pub fn destination_address(&self) -> Option<&str> {
        self.destination_ip_prefix
            .as_deref()
            .map(|prefix| prefix.split('/').next().unwrap_or(prefix))
    }
}

impl Resource for FlowClassifier {
    const KIND: ResourceKind = ResourceKind::FlowClassifier;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn clear_server_fields(&mut self) {
        self.id = None;
        self.project_id = None;
        self.tenant_id = None;
    }
}
