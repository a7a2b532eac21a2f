//! Redirection elements exchanged with the host
//!
//! Children are owned by their parent; the reverse relation is kept as an id
//! only (`parent_id`, `service_function_chain_id`) and is used solely for
//! lookups.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Element
// =============================================================================

/// Anything the host identifies by a provider-assigned id
pub trait Element: Send + Sync {
    /// Provider id, unset before the element is first created
    fn element_id(&self) -> Option<&str>;

    /// Id of the containing element, if any
    fn parent_id(&self) -> Option<&str>;

    /// Known IP addresses of the element, in provider order
    fn port_ips(&self) -> &[String] {
        &[]
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Tag encapsulation requested by the host for an inspection hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagEncapsulation {
    Vlan,
    Vxlan,
    Gre,
}

impl std::fmt::Display for TagEncapsulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagEncapsulation::Vlan => write!(f, "vlan"),
            TagEncapsulation::Vxlan => write!(f, "vxlan"),
            TagEncapsulation::Gre => write!(f, "gre"),
        }
    }
}

/// Behaviour requested when the inspection chain is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailOpen,
    FailClose,
    Na,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailOpen => write!(f, "fail_open"),
            FailurePolicy::FailClose => write!(f, "fail_close"),
            FailurePolicy::Na => write!(f, "na"),
        }
    }
}

// =============================================================================
// Network Element
// =============================================================================

/// One network port endpoint (ingress, egress or inspected port)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElement {
    pub element_id: Option<String>,
    /// MAC addresses in provider order
    pub mac_addresses: Vec<String>,
    /// IP addresses in provider order
    pub port_ips: Vec<String>,
    pub parent_id: Option<String>,
}

impl NetworkElement {
    pub fn new(
        element_id: impl Into<String>,
        mac_addresses: Vec<String>,
        port_ips: Vec<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            element_id: Some(element_id.into()),
            mac_addresses,
            port_ips,
            parent_id,
        }
    }

    /// An element known only by its id
    pub fn with_id(element_id: impl Into<String>) -> Self {
        Self {
            element_id: Some(element_id.into()),
            ..Default::default()
        }
    }
}

impl Element for NetworkElement {
    fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn port_ips(&self) -> &[String] {
        &self.port_ips
    }
}

// =============================================================================
// Inspection Port
// =============================================================================

/// Bump-in-the-wire inspection point, backed by a provider port pair.
///
/// Ingress and egress may be the same port. Without an id, an inspection
/// port is identified by its (ingress id, egress id) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionPort {
    /// Port pair id
    pub element_id: Option<String>,
    /// Owning port pair group id
    pub parent_id: Option<String>,
    pub ingress_port: Option<NetworkElement>,
    pub egress_port: Option<NetworkElement>,
}

impl InspectionPort {
    pub fn new(ingress: NetworkElement, egress: NetworkElement) -> Self {
        Self {
            element_id: None,
            parent_id: None,
            ingress_port: Some(ingress),
            egress_port: Some(egress),
        }
    }

    /// Request registration into an existing port pair group
    pub fn with_parent(mut self, port_pair_group_id: impl Into<String>) -> Self {
        self.parent_id = Some(port_pair_group_id.into());
        self
    }

    pub fn ingress_id(&self) -> Option<&str> {
        self.ingress_port.as_ref().and_then(|p| p.element_id.as_deref())
    }

    pub fn egress_id(&self) -> Option<&str> {
        self.egress_port.as_ref().and_then(|p| p.element_id.as_deref())
    }
}

impl Element for InspectionPort {
    fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }
}

// =============================================================================
// Port Pair Group
// =============================================================================

/// One stage of a chain: equivalent inspection ports sharing the load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortPairGroupElement {
    pub element_id: Option<String>,
    pub inspection_ports: Vec<InspectionPort>,
    /// Chain this group is a member of
    pub service_function_chain_id: Option<String>,
}

impl PortPairGroupElement {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: Some(element_id.into()),
            ..Default::default()
        }
    }

    /// Reference to this group, as passed to chain registration
    pub fn as_network_element(&self) -> NetworkElement {
        NetworkElement {
            element_id: self.element_id.clone(),
            parent_id: self.service_function_chain_id.clone(),
            ..Default::default()
        }
    }
}

impl Element for PortPairGroupElement {
    fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        self.service_function_chain_id.as_deref()
    }
}

// =============================================================================
// Service Function Chain
// =============================================================================

/// Ordered sequence of port pair groups; the order is the traffic path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFunctionChain {
    pub element_id: Option<String>,
    pub port_pair_groups: Vec<PortPairGroupElement>,
    /// Ids of the flow classifiers (inspection hooks) steering into this chain
    pub flow_classifier_ids: Vec<String>,
}

impl ServiceFunctionChain {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: Some(element_id.into()),
            ..Default::default()
        }
    }

    pub fn port_pair_group_ids(&self) -> Vec<&str> {
        self.port_pair_groups
            .iter()
            .filter_map(|g| g.element_id.as_deref())
            .collect()
    }

    /// Ingress of the first inspection port of the first group
    pub fn first_ingress(&self) -> Option<&NetworkElement> {
        self.port_pair_groups
            .first()
            .and_then(|g| g.inspection_ports.first())
            .and_then(|p| p.ingress_port.as_ref())
    }

    /// Egress of the last inspection port of the last group
    pub fn last_egress(&self) -> Option<&NetworkElement> {
        self.port_pair_groups
            .last()
            .and_then(|g| g.inspection_ports.last())
            .and_then(|p| p.egress_port.as_ref())
    }
}

impl Element for ServiceFunctionChain {
    fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    fn parent_id(&self) -> Option<&str> {
        None
    }
}

// =============================================================================
// Inspection Hook
// =============================================================================

/// Redirects traffic of `inspected_port` through `service_function_chain`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionHook {
    /// Backing flow classifier id
    pub hook_id: Option<String>,
    pub inspected_port: NetworkElement,
    pub service_function_chain: ServiceFunctionChain,
}

impl InspectionHook {
    pub fn new(inspected_port: NetworkElement, service_function_chain: ServiceFunctionChain) -> Self {
        Self {
            hook_id: None,
            inspected_port,
            service_function_chain,
        }
    }

    pub fn tag(&self) -> Result<u64> {
        Err(Error::Unsupported("Tags are not supported in neutron SFC.".into()))
    }

    pub fn order(&self) -> Result<u64> {
        Err(Error::Unsupported("Hook order is not supported in neutron SFC.".into()))
    }

    pub fn encapsulation(&self) -> Result<TagEncapsulation> {
        Err(Error::Unsupported(
            "Tag encapsulation is not supported in neutron SFC.".into(),
        ))
    }

    pub fn failure_policy(&self) -> Result<FailurePolicy> {
        Err(Error::Unsupported(
            "Failure policy is not supported in neutron SFC.".into(),
        ))
    }
}
