//! Domain Ports - Core trait definitions for the redirection engine
//!
//! `SdnRedirectionApi` is the contract consumed by the host orchestrator.
//! `SfcTransport` is the boundary to the remote SDN provider; adapters
//! implement it to provide concrete connectivity.

use crate::domain::elements::{
    Element, FailurePolicy, InspectionHook, InspectionPort, NetworkElement, ServiceFunctionChain,
    TagEncapsulation,
};
use crate::error::Result;
use crate::provider::resources::ResourceKind;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Transport Types
// =============================================================================

/// Failure of a raw provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP-equivalent status, `None` when no response was received
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Outcome of a delete call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub code: u16,
    pub fault: Option<String>,
}

impl ActionResponse {
    pub fn success() -> Self {
        Self {
            code: 204,
            fault: None,
        }
    }

    pub fn failure(code: u16, fault: impl Into<String>) -> Self {
        Self {
            code,
            fault: Some(fault.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }
}

// =============================================================================
// SFC Transport Port
// =============================================================================

/// Raw CRUD access to the provider's resources, as unwrapped JSON objects
#[async_trait]
pub trait SfcTransport: Send + Sync {
    /// Create a resource; `Ok(None)` when the call succeeded without a body
    async fn create(&self, kind: ResourceKind, body: Value) -> TransportResult<Option<Value>>;

    /// Fetch a resource; `Ok(None)` when it does not exist
    async fn get(&self, kind: ResourceKind, id: &str) -> TransportResult<Option<Value>>;

    /// List resources matching the query parameters
    async fn list(&self, kind: ResourceKind, query: &[(String, String)]) -> TransportResult<Vec<Value>>;

    /// Update a resource; `Ok(None)` when the call succeeded without a body
    async fn update(&self, kind: ResourceKind, id: &str, body: Value) -> TransportResult<Option<Value>>;

    /// Delete a resource
    async fn delete(&self, kind: ResourceKind, id: &str) -> TransportResult<ActionResponse>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

// =============================================================================
// Redirection API Port
// =============================================================================

/// Redirection abstraction consumed by the host orchestrator
#[async_trait]
pub trait SdnRedirectionApi: Send + Sync {
    // Inspection ports

    /// Find an inspection port by id, falling back to its (ingress, egress) pair
    async fn get_inspection_port(&self, inspection_port: &InspectionPort) -> Result<Option<InspectionPort>>;

    /// Find-or-create an inspection port, creating its group when no parent is given
    async fn register_inspection_port(&self, inspection_port: &InspectionPort) -> Result<InspectionPort>;

    /// Remove an inspection port and its group once the group is empty
    async fn remove_inspection_port(&self, inspection_port: &InspectionPort) -> Result<()>;

    // Inspection hooks

    /// Redirect traffic of `inspected_port` through `inspection_port` (a chain)
    async fn install_inspection_hook(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
        tag: Option<u64>,
        encapsulation: Option<TagEncapsulation>,
        order: Option<u64>,
        failure_policy: Option<FailurePolicy>,
    ) -> Result<String>;

    /// Point an existing hook at another chain
    async fn update_inspection_hook(&self, hook: &InspectionHook) -> Result<()>;

    async fn remove_inspection_hook(&self, hook_id: &str) -> Result<()>;

    async fn get_inspection_hook(&self, hook_id: &str) -> Result<Option<InspectionHook>>;

    // Service function chains

    /// Create a chain from existing port pair groups, in the given order
    async fn register_network_element(&self, port_pair_groups: &[NetworkElement]) -> Result<ServiceFunctionChain>;

    /// Replace the group list of a chain, in the given order
    async fn update_network_element(
        &self,
        service_function_chain: &dyn Element,
        port_pair_groups: &[NetworkElement],
    ) -> Result<ServiceFunctionChain>;

    async fn delete_network_element(&self, service_function_chain: &dyn Element) -> Result<()>;

    /// Read a chain with its groups, inspection ports and endpoints
    async fn get_network_elements(&self, service_function_chain: &dyn Element) -> Result<ServiceFunctionChain>;

    // Operations the provider's chain model cannot represent

    async fn get_inspection_hook_by_ports(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
    ) -> Result<Option<InspectionHook>>;

    async fn remove_inspection_hook_by_ports(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
    ) -> Result<()>;

    async fn remove_all_inspection_hooks(&self, inspected_port: &dyn Element) -> Result<()>;

    async fn get_inspection_hook_tag(&self, inspected_port: &dyn Element, inspection_port: &dyn Element) -> Result<u64>;

    async fn set_inspection_hook_tag(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
        tag: u64,
    ) -> Result<()>;

    async fn get_inspection_hook_failure_policy(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
    ) -> Result<FailurePolicy>;

    async fn set_inspection_hook_failure_policy(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
        failure_policy: FailurePolicy,
    ) -> Result<()>;

    async fn get_inspection_hook_order(&self, inspected_port: &dyn Element, inspection_port: &dyn Element) -> Result<u64>;

    async fn set_inspection_hook_order(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
        order: u64,
    ) -> Result<()>;

    async fn get_network_element_by_device_owner_id(&self, device_owner_id: &str) -> Result<Option<NetworkElement>>;

    /// Release provider resources held by this instance
    async fn close(&self) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type SfcTransportRef = Arc<dyn SfcTransport>;
pub type SdnRedirectionApiRef = Arc<dyn SdnRedirectionApi>;
