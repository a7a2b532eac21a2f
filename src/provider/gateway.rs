//! Provider Gateway
//!
//! Thin, retry-free typed wrapper over an [`SfcTransport`]. It normalizes the
//! three outcomes of a remote call (not found, failed, succeeded without a
//! result) and never sends server-owned fields back to the provider.

use crate::domain::ports::{ActionResponse, SfcTransport, SfcTransportRef, TransportError};
use crate::error::{Error, Operation, Result};
use crate::provider::resources::{
    FlowClassifier, Port, PortChain, PortFilter, PortPair, PortPairGroup, Resource, ResourceKind,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed access to the provider's SFC and port resources
#[derive(Clone)]
pub struct SfcGateway {
    transport: SfcTransportRef,
}

impl SfcGateway {
    pub fn new(transport: Arc<dyn SfcTransport>) -> Self {
        Self { transport }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    // =========================================================================
    // Generic Calls
    // =========================================================================

    async fn create_resource<R: Resource>(&self, mut resource: R) -> Result<R> {
        let kind = R::KIND;
        resource.clear_server_fields();
        let body = serde_json::to_value(&resource)?;

        debug!("Creating {} on {}", kind, self.transport.name());
        let created = self
            .transport
            .create(kind, body)
            .await
            .map_err(|e| call_failure(Operation::Create, kind, e))?;

        decode_result(Operation::Create, kind, created)
    }

    async fn get_resource<R: Resource>(&self, id: &str) -> Result<Option<R>> {
        let kind = R::KIND;
        require_id(kind, id)?;

        let found = self
            .transport
            .get(kind, id)
            .await
            .map_err(|e| call_failure(Operation::Get, kind, e))?;

        match found {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => {
                debug!("{} {} not found", kind, id);
                Ok(None)
            }
        }
    }

    async fn list_resources<R: Resource>(&self, query: &[(String, String)]) -> Result<Vec<R>> {
        let kind = R::KIND;
        let values = self
            .transport
            .list(kind, query)
            .await
            .map_err(|e| call_failure(Operation::List, kind, e))?;

        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn update_resource<R: Resource>(&self, id: &str, mut resource: R) -> Result<R> {
        let kind = R::KIND;
        require_id(kind, id)?;

        // The provider rejects read-only attributes on update
        resource.clear_server_fields();
        let body = serde_json::to_value(&resource)?;

        debug!("Updating {} {} on {}", kind, id, self.transport.name());
        let updated = self
            .transport
            .update(kind, id, body)
            .await
            .map_err(|e| call_failure(Operation::Update, kind, e))?;

        decode_result(Operation::Update, kind, updated)
    }

    /// Delete treating an already-absent resource as success
    async fn delete_idempotent(&self, kind: ResourceKind, id: &str) -> Result<()> {
        require_id(kind, id)?;

        debug!("Deleting {} {} on {}", kind, id, self.transport.name());
        let response = self
            .transport
            .delete(kind, id)
            .await
            .map_err(|e| call_failure(Operation::Delete, kind, e))?;

        if response.is_success() {
            Ok(())
        } else if response.is_not_found() {
            warn!("{} {} already absent, treating delete as done", kind, id);
            Ok(())
        } else {
            Err(Error::ProviderCallFailure {
                operation: Operation::Delete,
                kind: kind.display_name().to_string(),
                status: Some(response.code),
                reason: response.fault.unwrap_or_default(),
            })
        }
    }

    // =========================================================================
    // Ports
    // =========================================================================

    pub async fn create_port(&self, port: Port) -> Result<Port> {
        self.create_resource(port).await
    }

    pub async fn get_port(&self, id: &str) -> Result<Option<Port>> {
        self.get_resource(id).await
    }

    pub async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>> {
        self.list_resources(&filter.to_query()).await
    }

    pub async fn update_port(&self, id: &str, port: Port) -> Result<Port> {
        self.update_resource(id, port).await
    }

    pub async fn delete_port(&self, id: &str) -> Result<()> {
        self.delete_idempotent(ResourceKind::Port, id).await
    }

    // =========================================================================
    // Port Pairs
    // =========================================================================

    pub async fn create_port_pair(&self, port_pair: PortPair) -> Result<PortPair> {
        self.create_resource(port_pair).await
    }

    pub async fn get_port_pair(&self, id: &str) -> Result<Option<PortPair>> {
        self.get_resource(id).await
    }

    pub async fn list_port_pairs(&self) -> Result<Vec<PortPair>> {
        self.list_resources(&[]).await
    }

    pub async fn update_port_pair(&self, id: &str, port_pair: PortPair) -> Result<PortPair> {
        self.update_resource(id, port_pair).await
    }

    pub async fn delete_port_pair(&self, id: &str) -> Result<()> {
        self.delete_idempotent(ResourceKind::PortPair, id).await
    }

    // =========================================================================
    // Port Pair Groups
    // =========================================================================

    pub async fn create_port_pair_group(&self, group: PortPairGroup) -> Result<PortPairGroup> {
        self.create_resource(group).await
    }

    pub async fn get_port_pair_group(&self, id: &str) -> Result<Option<PortPairGroup>> {
        self.get_resource(id).await
    }

    pub async fn list_port_pair_groups(&self) -> Result<Vec<PortPairGroup>> {
        self.list_resources(&[]).await
    }

    pub async fn update_port_pair_group(&self, id: &str, group: PortPairGroup) -> Result<PortPairGroup> {
        self.update_resource(id, group).await
    }

    pub async fn delete_port_pair_group(&self, id: &str) -> Result<()> {
        self.delete_idempotent(ResourceKind::PortPairGroup, id).await
    }

    // =========================================================================
    // Port Chains
    // =========================================================================

    pub async fn create_port_chain(&self, chain: PortChain) -> Result<PortChain> {
        self.create_resource(chain).await
    }

    pub async fn get_port_chain(&self, id: &str) -> Result<Option<PortChain>> {
        self.get_resource(id).await
    }

    pub async fn list_port_chains(&self) -> Result<Vec<PortChain>> {
        self.list_resources(&[]).await
    }

    pub async fn update_port_chain(&self, id: &str, chain: PortChain) -> Result<PortChain> {
        self.update_resource(id, chain).await
    }

    /// Delete a port chain, handing the raw response to the caller
    pub async fn delete_port_chain(&self, id: &str) -> Result<ActionResponse> {
        let kind = ResourceKind::PortChain;
        require_id(kind, id)?;

        debug!("Deleting {} {} on {}", kind, id, self.transport.name());
        self.transport
            .delete(kind, id)
            .await
            .map_err(|e| call_failure(Operation::Delete, kind, e))
    }

    // =========================================================================
    // Flow Classifiers
    // =========================================================================

    pub async fn create_flow_classifier(&self, classifier: FlowClassifier) -> Result<FlowClassifier> {
        self.create_resource(classifier).await
    }

    pub async fn get_flow_classifier(&self, id: &str) -> Result<Option<FlowClassifier>> {
        self.get_resource(id).await
    }

    pub async fn list_flow_classifiers(&self) -> Result<Vec<FlowClassifier>> {
        self.list_resources(&[]).await
    }

    pub async fn update_flow_classifier(&self, id: &str, classifier: FlowClassifier) -> Result<FlowClassifier> {
        self.update_resource(id, classifier).await
    }

    pub async fn delete_flow_classifier(&self, id: &str) -> Result<()> {
        self.delete_idempotent(ResourceKind::FlowClassifier, id).await
    }
}

fn require_id(kind: ResourceKind, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidArgument(format!("{} Id", kind)));
    }
    Ok(())
}

fn call_failure(operation: Operation, kind: ResourceKind, err: TransportError) -> Error {
    Error::ProviderCallFailure {
        operation,
        kind: kind.display_name().to_string(),
        status: err.status,
        reason: err.message,
    }
}

fn decode_result<R: Resource>(
    operation: Operation,
    kind: ResourceKind,
    value: Option<serde_json::Value>,
) -> Result<R> {
    let null_result = || Error::ProviderNullResult {
        operation,
        kind: kind.display_name().to_string(),
    };

    let value = value.filter(|v| !v.is_null()).ok_or_else(null_result)?;
    let resource: R = serde_json::from_value(value)?;
    if resource.id().is_none() {
        return Err(null_result());
    }
    Ok(resource)
}
