//! Neutron SFC Redirection API
//!
//! Maps inspection ports, hooks and chains onto Neutron SFC resources:
//! - Inspection port: port pair, grouped in a port pair group
//! - Service function chain: port chain over port pair groups
//! - Inspection hook: flow classifier attached to a port chain, with its id
//!   tagged on the inspected port's binding profile
//!
//! The provider is the only source of truth. Every call re-reads what it
//! needs and no remote call is retried.

use crate::config::RedirectionConfig;
use crate::domain::elements::{
    Element, FailurePolicy, InspectionHook, InspectionPort, NetworkElement, ServiceFunctionChain,
    TagEncapsulation,
};
use crate::domain::ports::{SdnRedirectionApi, SdnRedirectionApiRef, SfcTransportRef};
use crate::error::{Error, Operation, Result};
use crate::provider::gateway::SfcGateway;
use crate::provider::resources::{PortChain, PortPair, PortPairGroup};
use crate::provider::TransportFactory;
use crate::redirection::utils::{self, RedirectionUtils};
use crate::redirection::validation::{port_pair_group_ids, require_arg, require_found, require_id, require_non_empty};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DESCRIPTION: &str = "Created by sfc-redirection";

/// Redirection API backed by Neutron SFC
pub struct NeutronSfcRedirectionApi {
    gateway: SfcGateway,
    utils: RedirectionUtils,
}

impl NeutronSfcRedirectionApi {
    /// Build the API over a transport, tagging inspected ports under `hook_tag_key`
    pub fn new(transport: SfcTransportRef, hook_tag_key: impl Into<String>) -> Self {
        let gateway = SfcGateway::new(transport);
        let utils = RedirectionUtils::new(gateway.clone(), hook_tag_key);
        Self { gateway, utils }
    }

    /// Provider gateway used by every operation
    pub fn gateway(&self) -> &SfcGateway {
        &self.gateway
    }

    /// Replace the classifier list of a chain
    async fn set_flow_classifiers(&self, chain: &PortChain, flow_classifiers: Vec<String>) -> Result<PortChain> {
        let chain_id = chain.id.as_deref().unwrap_or_default();
        let change = PortChain {
            flow_classifiers,
            ..chain.clone()
        };
        self.gateway.update_port_chain(chain_id, change).await
    }

    async fn attach_flow_classifier(&self, chain: &PortChain, flow_classifier_id: &str) -> Result<PortChain> {
        let mut ids = chain.flow_classifiers.clone();
        if !ids.iter().any(|id| id == flow_classifier_id) {
            ids.push(flow_classifier_id.to_string());
        }
        self.set_flow_classifiers(chain, ids).await
    }

    async fn detach_flow_classifier(&self, chain: &PortChain, flow_classifier_id: &str) -> Result<PortChain> {
        let ids = chain
            .flow_classifiers
            .iter()
            .filter(|id| id.as_str() != flow_classifier_id)
            .cloned()
            .collect();
        self.set_flow_classifiers(chain, ids).await
    }

    fn unsupported_hook_lookup(&self, action: &str, inspected_port: &dyn Element, inspection_port: &dyn Element) -> Error {
        Error::Unsupported(format!(
            "{} inspection hooks with Inspected port: {} and Inspection port: {} is not supported.",
            action,
            inspected_port.element_id().unwrap_or("null"),
            inspection_port.element_id().unwrap_or("null")
        ))
    }
}

#[async_trait]
impl SdnRedirectionApi for NeutronSfcRedirectionApi {
    // =========================================================================
    // Inspection Ports
    // =========================================================================

    async fn get_inspection_port(&self, inspection_port: &InspectionPort) -> Result<Option<InspectionPort>> {
        let Some(pair) = self.utils.find_port_pair_for_inspection_port(inspection_port).await? else {
            debug!(
                "No inspection port for ingress {:?} and egress {:?}",
                inspection_port.ingress_id(),
                inspection_port.egress_id()
            );
            return Ok(None);
        };

        let pair_id = pair.id.clone().unwrap_or_default();
        let group_id = self.utils.find_containing_group(&pair_id).await?.and_then(|g| g.id);
        Ok(Some(self.utils.fetch_inspection_port(&pair, group_id).await?))
    }

    async fn register_inspection_port(&self, inspection_port: &InspectionPort) -> Result<InspectionPort> {
        let ingress_id = require_arg(inspection_port.ingress_id(), "Ingress port")?;
        let egress_id = require_arg(inspection_port.egress_id(), "Egress port")?;

        let requested_group = match inspection_port.parent_id.as_deref().filter(|id| !id.is_empty()) {
            Some(group_id) => Some(require_found(
                self.gateway.get_port_pair_group(group_id).await?,
                "Port Pair Group",
                group_id,
            )?),
            None => None,
        };

        let (pair, created) = match self.utils.find_port_pair_by_ports(Some(ingress_id), Some(egress_id)).await? {
            Some(existing) => (existing, false),
            None => {
                let pair = PortPair {
                    name: Some(format!("sfc-pair-{}", ingress_id)),
                    description: Some(DESCRIPTION.to_string()),
                    ingress: Some(ingress_id.to_string()),
                    egress: Some(egress_id.to_string()),
                    ..Default::default()
                };
                (self.gateway.create_port_pair(pair).await?, true)
            }
        };
        let pair_id = pair.id.clone().unwrap_or_default();

        let parent = match self.utils.find_containing_group(&pair_id).await? {
            Some(group) => {
                debug!("Port pair {} already registered in group {:?}", pair_id, group.id);
                group
            }
            None => {
                let attached = match requested_group {
                    Some(group) => {
                        let group_id = group.id.clone().unwrap_or_default();
                        let mut port_pairs = group.port_pairs.clone();
                        port_pairs.push(pair_id.clone());
                        self.gateway
                            .update_port_pair_group(&group_id, PortPairGroup { port_pairs, ..group })
                            .await
                    }
                    None => {
                        let group = PortPairGroup {
                            name: Some(format!("sfc-group-{}", pair_id)),
                            description: Some(DESCRIPTION.to_string()),
                            port_pairs: vec![pair_id.clone()],
                            ..Default::default()
                        };
                        self.gateway.create_port_pair_group(group).await
                    }
                };

                match attached {
                    Ok(group) => group,
                    Err(e) if created => {
                        return Err(Error::partial(
                            format!("attach Port Pair {} to a Port Pair Group", pair_id),
                            e,
                        ))
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        info!("Registered inspection port {} in group {:?}", pair_id, parent.id);
        Ok(InspectionPort {
            element_id: Some(pair_id),
            parent_id: parent.id,
            ingress_port: inspection_port.ingress_port.clone(),
            egress_port: inspection_port.egress_port.clone(),
        })
    }

    async fn remove_inspection_port(&self, inspection_port: &InspectionPort) -> Result<()> {
        let Some(pair) = self.utils.find_port_pair_for_inspection_port(inspection_port).await? else {
            warn!(
                "Attempt to remove nonexistent inspection port for ingress {:?} and egress {:?}",
                inspection_port.ingress_id(),
                inspection_port.egress_id()
            );
            return Ok(());
        };
        let pair_id = pair.id.clone().unwrap_or_default();

        let mut group_changed = false;
        if let Some(group) = self.utils.find_containing_group(&pair_id).await? {
            let group_id = group.id.clone().unwrap_or_default();
            let remaining: Vec<String> = group.port_pairs.iter().filter(|id| **id != pair_id).cloned().collect();

            if remaining.is_empty() {
                info!("Port pair group {} is empty, deleting it", group_id);
                self.gateway.delete_port_pair_group(&group_id).await?;
            } else {
                let change = PortPairGroup {
                    port_pairs: remaining,
                    ..group
                };
                self.gateway.update_port_pair_group(&group_id, change).await?;
            }
            group_changed = true;
        }

        match self.gateway.delete_port_pair(&pair_id).await {
            Ok(()) => {
                info!("Removed inspection port {}", pair_id);
                Ok(())
            }
            Err(e) if group_changed => Err(Error::partial(format!("delete Port Pair {}", pair_id), e)),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Inspection Hooks
    // =========================================================================

    async fn install_inspection_hook(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
        tag: Option<u64>,
        encapsulation: Option<TagEncapsulation>,
        order: Option<u64>,
        failure_policy: Option<FailurePolicy>,
    ) -> Result<String> {
        let inspected_id = require_id(inspected_port, "Inspected port")?;
        let chain_id = require_id(inspection_port, "Inspection port")?;

        if tag.is_some() || encapsulation.is_some() || order.is_some() || failure_policy.is_some() {
            debug!("Ignoring tag, encapsulation, order and failure policy for hook on {}", inspected_id);
        }
        info!(
            "Installing inspection hook for (Inspected Port {} ; Inspection Port {})",
            inspected_id, chain_id
        );

        let chain = require_found(
            self.gateway.get_port_chain(chain_id).await?,
            "Service Function Chain",
            chain_id,
        )?;
        let port = require_found(self.gateway.get_port(inspected_id).await?, "Port", inspected_id)?;

        if let Some(existing) = self.utils.find_hook_on_port(&port).await? {
            let msg = format!(
                "Found existing inspection hook (Inspected {} ; Inspection Port {})",
                inspected_id, chain_id
            );
            error!("{} {}", msg, existing);
            return Err(Error::Conflict(msg));
        }

        let tree = self.utils.fetch_chain_tree(&chain).await?;
        let classifier = utils::build_flow_classifier(&tree, &port, inspected_port.port_ips())?;
        let created = self.gateway.create_flow_classifier(classifier).await?;
        let hook_id = created.id.clone().unwrap_or_default();

        self.utils
            .set_hook_tag(&port, Some(hook_id.as_str()))
            .await
            .map_err(|e| Error::partial(format!("tag Port {} with inspection hook {}", inspected_id, hook_id), e))?;

        self.attach_flow_classifier(&chain, &hook_id).await.map_err(|e| {
            Error::partial(
                format!("attach Flow Classifier {} to Service Function Chain {}", hook_id, chain_id),
                e,
            )
        })?;

        info!("Installed inspection hook {}", hook_id);
        Ok(hook_id)
    }

    async fn update_inspection_hook(&self, hook: &InspectionHook) -> Result<()> {
        let hook_id = require_arg(hook.hook_id.as_deref(), "Inspection Hook Id")?;
        let inspected_id = require_id(&hook.inspected_port, "Inspected port")?;
        let new_chain_id = require_id(&hook.service_function_chain, "Inspection port")?;

        info!("Updating inspection hook {} to chain {}", hook_id, new_chain_id);

        let classifier = require_found(
            self.gateway.get_flow_classifier(hook_id).await?,
            "Inspection Hook",
            hook_id,
        )?;

        let stored_port = self.utils.find_tagged_port(&classifier).await?;
        let stored_id = stored_port.as_ref().and_then(|p| p.id.as_deref());
        if stored_id != Some(inspected_id) {
            return Err(Error::Conflict(format!(
                "Cannot update Inspected Port from {} to {} for the Inspection hook {}",
                stored_id.unwrap_or("null"),
                inspected_id,
                hook_id
            )));
        }

        let new_chain = require_found(
            self.gateway.get_port_chain(new_chain_id).await?,
            "Service Function Chain",
            new_chain_id,
        )?;

        let old_chain = self.utils.find_chain_for_flow_classifier(hook_id).await?;
        if let Some(old) = &old_chain {
            if old.id.as_deref() == Some(new_chain_id) {
                debug!("Inspection hook {} already targets chain {}", hook_id, new_chain_id);
                return Ok(());
            }
            self.detach_flow_classifier(old, hook_id).await?;
        }

        match self.attach_flow_classifier(&new_chain, hook_id).await {
            Ok(_) => Ok(()),
            Err(e) if old_chain.is_some() => Err(Error::partial(
                format!("attach Flow Classifier {} to Service Function Chain {}", hook_id, new_chain_id),
                e,
            )),
            Err(e) => Err(e),
        }
    }

    async fn remove_inspection_hook(&self, hook_id: &str) -> Result<()> {
        let hook_id = require_arg(Some(hook_id), "Inspection Hook Id")?;

        let Some(classifier) = self.gateway.get_flow_classifier(hook_id).await? else {
            info!("Inspection hook {} does not exist, nothing to remove", hook_id);
            self.utils.clear_vanished_hook_tag(hook_id).await?;
            return Ok(());
        };
        let tagged_port = self.utils.find_tagged_port(&classifier).await?;

        let mut applied = false;
        if let Some(chain) = self.utils.find_chain_for_flow_classifier(hook_id).await? {
            self.detach_flow_classifier(&chain, hook_id).await?;
            applied = true;
        }

        if let Err(e) = self.gateway.delete_flow_classifier(hook_id).await {
            return Err(if applied {
                Error::partial(format!("delete Flow Classifier {}", hook_id), e)
            } else {
                e
            });
        }

        if let Some(port) = tagged_port {
            let port_id = port.id.clone().unwrap_or_default();
            self.utils
                .set_hook_tag(&port, None)
                .await
                .map_err(|e| Error::partial(format!("clear inspection hook tag of Port {}", port_id), e))?;
        }

        info!("Removed inspection hook {}", hook_id);
        Ok(())
    }

    async fn get_inspection_hook(&self, hook_id: &str) -> Result<Option<InspectionHook>> {
        let hook_id = require_arg(Some(hook_id), "Inspection Hook Id")?;

        let Some(classifier) = self.gateway.get_flow_classifier(hook_id).await? else {
            self.utils.clear_vanished_hook_tag(hook_id).await?;
            return Ok(None);
        };

        let inspected_port = match self.utils.find_tagged_port(&classifier).await? {
            Some(port) => utils::network_element_from_port(&port, None),
            None => {
                warn!("No port is tagged with inspection hook {}", hook_id);
                NetworkElement::default()
            }
        };

        let service_function_chain = match self.utils.find_chain_for_flow_classifier(hook_id).await? {
            Some(chain) => self.utils.fetch_chain_tree(&chain).await?,
            None => {
                warn!("Inspection hook {} is not attached to any chain", hook_id);
                ServiceFunctionChain::default()
            }
        };

        Ok(Some(InspectionHook {
            hook_id: Some(hook_id.to_string()),
            inspected_port,
            service_function_chain,
        }))
    }

    // =========================================================================
    // Service Function Chains
    // =========================================================================

    async fn register_network_element(&self, port_pair_groups: &[NetworkElement]) -> Result<ServiceFunctionChain> {
        require_non_empty(port_pair_groups, "Port Pair Group member list")?;
        let group_ids = port_pair_group_ids(port_pair_groups)?;

        self.utils.validate_port_pair_groups(&group_ids, None).await?;

        let chain = PortChain {
            description: Some(DESCRIPTION.to_string()),
            port_pair_groups: group_ids,
            ..Default::default()
        };
        let created = self.gateway.create_port_chain(chain).await?;

        info!("Registered service function chain {:?}", created.id);
        Ok(utils::shallow_chain(&created))
    }

    async fn update_network_element(
        &self,
        service_function_chain: &dyn Element,
        port_pair_groups: &[NetworkElement],
    ) -> Result<ServiceFunctionChain> {
        let chain_id = require_id(service_function_chain, "Port Pair Group Service Function Chain Id")?;
        require_non_empty(port_pair_groups, "Port Pair Group update member list")?;
        let group_ids = port_pair_group_ids(port_pair_groups)?;

        let chain = require_found(
            self.gateway.get_port_chain(chain_id).await?,
            "Service Function Chain",
            chain_id,
        )?;
        self.utils.validate_port_pair_groups(&group_ids, Some(chain_id)).await?;

        let cleared = PortChain {
            port_pair_groups: Vec::new(),
            ..chain
        };
        let cleared = self.gateway.update_port_chain(chain_id, cleared).await?;

        let reordered = PortChain {
            port_pair_groups: group_ids,
            ..cleared
        };
        let updated = self.gateway.update_port_chain(chain_id, reordered).await.map_err(|e| {
            error!("Service function chain {} left without port pair groups", chain_id);
            Error::partial(format!("set Port Pair Groups of Service Function Chain {}", chain_id), e)
        })?;

        info!("Updated service function chain {}", chain_id);
        Ok(utils::shallow_chain(&updated))
    }

    async fn delete_network_element(&self, service_function_chain: &dyn Element) -> Result<()> {
        let chain_id = require_id(service_function_chain, "Service Function Chain Id")?;
        require_found(
            self.gateway.get_port_chain(chain_id).await?,
            "Service Function Chain",
            chain_id,
        )?;

        let response = self.gateway.delete_port_chain(chain_id).await?;
        if !response.is_success() {
            return Err(Error::ProviderCallFailure {
                operation: Operation::Delete,
                kind: "Service Function Chain".to_string(),
                status: Some(response.code),
                reason: format!(
                    "Exception deleting SFC {}. Status {}\nMessage:\n{}",
                    chain_id,
                    response.code,
                    response.fault.unwrap_or_default()
                ),
            });
        }

        info!("Deleted service function chain {}", chain_id);
        Ok(())
    }

    async fn get_network_elements(&self, service_function_chain: &dyn Element) -> Result<ServiceFunctionChain> {
        let chain_id = require_id(service_function_chain, "Service Function Chain Id")?;
        let chain = require_found(
            self.gateway.get_port_chain(chain_id).await?,
            "Service Function Chain",
            chain_id,
        )?;
        self.utils.fetch_chain_tree(&chain).await
    }

    // =========================================================================
    // Unsupported
    // =========================================================================

    async fn get_inspection_hook_by_ports(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
    ) -> Result<Option<InspectionHook>> {
        Err(self.unsupported_hook_lookup("Retriving", inspected_port, inspection_port))
    }

    async fn remove_inspection_hook_by_ports(
        &self,
        inspected_port: &dyn Element,
        inspection_port: &dyn Element,
    ) -> Result<()> {
        Err(self.unsupported_hook_lookup("Removing", inspected_port, inspection_port))
    }

    async fn remove_all_inspection_hooks(&self, _inspected_port: &dyn Element) -> Result<()> {
        Err(Error::Unsupported(
            "Removing all inspection hooks is not supported in neutron SFC.".into(),
        ))
    }

    async fn get_inspection_hook_tag(&self, _inspected_port: &dyn Element, _inspection_port: &dyn Element) -> Result<u64> {
        Err(Error::Unsupported("Tags are not supported in neutron SFC.".into()))
    }

    async fn set_inspection_hook_tag(
        &self,
        _inspected_port: &dyn Element,
        _inspection_port: &dyn Element,
        _tag: u64,
    ) -> Result<()> {
        Err(Error::Unsupported("Tags are not supported in neutron SFC.".into()))
    }

    async fn get_inspection_hook_failure_policy(
        &self,
        _inspected_port: &dyn Element,
        _inspection_port: &dyn Element,
    ) -> Result<FailurePolicy> {
        Err(Error::Unsupported("Failure policy is not supported in neutron SFC.".into()))
    }

    async fn set_inspection_hook_failure_policy(
        &self,
        _inspected_port: &dyn Element,
        _inspection_port: &dyn Element,
        _failure_policy: FailurePolicy,
    ) -> Result<()> {
        Err(Error::Unsupported("Failure policy is not supported in neutron SFC.".into()))
    }

    async fn get_inspection_hook_order(&self, _inspected_port: &dyn Element, _inspection_port: &dyn Element) -> Result<u64> {
        Err(Error::Unsupported("Hook order is not supported in neutron SFC.".into()))
    }

    async fn set_inspection_hook_order(
        &self,
        _inspected_port: &dyn Element,
        _inspection_port: &dyn Element,
        _order: u64,
    ) -> Result<()> {
        Err(Error::Unsupported("Hook order is not supported in neutron SFC.".into()))
    }

    async fn get_network_element_by_device_owner_id(&self, _device_owner_id: &str) -> Result<Option<NetworkElement>> {
        Err(Error::Unsupported(
            "Retrieving the network element given the device owner id is currently not supported.".into(),
        ))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing redirection API on {}", self.gateway.transport_name());
        Ok(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds the redirection API on the configured transport
pub struct RedirectionApiFactory;

impl RedirectionApiFactory {
    pub fn create(config: &RedirectionConfig) -> Result<SdnRedirectionApiRef> {
        config.validate()?;
        let transport = TransportFactory::create(config.provider, &config.neutron)?;
        info!("Redirection API using {} provider", config.provider);
        Ok(Arc::new(NeutronSfcRedirectionApi::new(transport, config.hook_tag_key.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderKind, DEFAULT_HOOK_TAG_KEY};
    use crate::error::ErrorKind;
    use crate::provider::memory::InMemorySfcTransport;
    use crate::provider::resources::{FixedIp, Port, ResourceKind};
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU8, Ordering};

    struct Fixture {
        transport: Arc<InMemorySfcTransport>,
        api: NeutronSfcRedirectionApi,
        next_ip: AtomicU8,
    }

    impl Fixture {
        fn new() -> Self {
            let transport = Arc::new(InMemorySfcTransport::new());
            let api = NeutronSfcRedirectionApi::new(transport.clone(), DEFAULT_HOOK_TAG_KEY);
            Self {
                transport,
                api,
                next_ip: AtomicU8::new(10),
            }
        }

        /// Seed a provider port and return it as an element
        fn port(&self) -> NetworkElement {
            let octet = self.next_ip.fetch_add(1, Ordering::Relaxed);
            let ip = format!("10.0.0.{}", octet);
            let mac = format!("fa:16:3e:00:00:{:02x}", octet);
            let id = self.transport.seed_port(Port {
                mac_address: Some(mac.clone()),
                fixed_ips: vec![FixedIp {
                    subnet_id: Some("subnet-1".into()),
                    ip_address: ip.clone(),
                }],
                ..Default::default()
            });
            NetworkElement::new(id, vec![mac], vec![ip], None)
        }

        async fn inspection_port(&self) -> InspectionPort {
            let request = InspectionPort::new(self.port(), self.port());
            self.api.register_inspection_port(&request).await.unwrap()
        }

        async fn chain(&self) -> ServiceFunctionChain {
            let port = self.inspection_port().await;
            let group = NetworkElement::with_id(port.parent_id.unwrap());
            self.api.register_network_element(&[group]).await.unwrap()
        }

        async fn tagged_hook(&self, port_id: &str) -> Option<String> {
            let port = self.api.gateway().get_port(port_id).await.unwrap().unwrap();
            port.profile_value(DEFAULT_HOOK_TAG_KEY).map(str::to_string)
        }
    }

    // -- inspection ports -----------------------------------------------------

    #[tokio::test]
    async fn test_register_inspection_port_is_idempotent() {
        let fx = Fixture::new();
        let request = InspectionPort::new(fx.port(), fx.port());

        let first = fx.api.register_inspection_port(&request).await.unwrap();
        let second = fx.api.register_inspection_port(&request).await.unwrap();

        assert!(first.element_id.is_some());
        assert_eq!(first.element_id, second.element_id);
        assert_eq!(first.parent_id, second.parent_id);
        assert_eq!(fx.transport.count(ResourceKind::PortPair), 1);
        assert_eq!(fx.transport.count(ResourceKind::PortPairGroup), 1);
    }

    #[tokio::test]
    async fn test_register_single_point_inspection_port() {
        let fx = Fixture::new();
        let port = fx.port();

        let registered = fx
            .api
            .register_inspection_port(&InspectionPort::new(port.clone(), port.clone()))
            .await
            .unwrap();

        assert_eq!(registered.ingress_id(), registered.egress_id());
        let found = fx.api.get_inspection_port(&registered).await.unwrap().unwrap();
        assert_eq!(found.element_id, registered.element_id);
        assert_eq!(found.ingress_port.unwrap().port_ips, port.port_ips);
    }

    #[tokio::test]
    async fn test_register_into_existing_group() {
        let fx = Fixture::new();
        let first = fx.inspection_port().await;
        let group_id = first.parent_id.clone().unwrap();

        let request = InspectionPort::new(fx.port(), fx.port()).with_parent(group_id.clone());
        let second = fx.api.register_inspection_port(&request).await.unwrap();

        assert_eq!(second.parent_id.as_deref(), Some(group_id.as_str()));
        let group = fx.api.gateway().get_port_pair_group(&group_id).await.unwrap().unwrap();
        assert_eq!(group.port_pairs, vec![first.element_id.unwrap(), second.element_id.unwrap()]);
    }

    #[tokio::test]
    async fn test_register_with_unknown_group() {
        let fx = Fixture::new();
        let request = InspectionPort::new(fx.port(), fx.port()).with_parent("nope");

        let err = fx.api.register_inspection_port(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot find Port Pair Group by id: nope!");
        assert_eq!(fx.transport.count(ResourceKind::PortPair), 0);
    }

    #[tokio::test]
    async fn test_register_recovers_orphan_pair() {
        let fx = Fixture::new();
        let (ingress, egress) = (fx.port(), fx.port());
        let orphan = fx
            .api
            .gateway()
            .create_port_pair(PortPair {
                ingress: ingress.element_id.clone(),
                egress: egress.element_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let registered = fx
            .api
            .register_inspection_port(&InspectionPort::new(ingress, egress))
            .await
            .unwrap();

        assert_eq!(registered.element_id, orphan.id);
        assert!(registered.parent_id.is_some());
        assert_eq!(fx.transport.count(ResourceKind::PortPair), 1);
    }

    #[tokio::test]
    async fn test_register_group_failure_is_partial() {
        let fx = Fixture::new();
        fx.transport
            .fail_next(ResourceKind::PortPairGroup, Operation::Create, Some(500));

        let request = InspectionPort::new(fx.port(), fx.port());
        let err = fx.api.register_inspection_port(&request).await.unwrap_err();

        assert_matches!(err, Error::PartialApply { ref step, .. } if step.contains("attach Port Pair"));
        assert_eq!(err.kind(), ErrorKind::ProviderCallFailure);
        assert_eq!(fx.transport.count(ResourceKind::PortPair), 1);

        // re-invoking completes the registration
        let registered = fx.api.register_inspection_port(&request).await.unwrap();
        assert!(registered.parent_id.is_some());
        assert_eq!(fx.transport.count(ResourceKind::PortPair), 1);
    }

    #[tokio::test]
    async fn test_remove_last_member_deletes_group() {
        let fx = Fixture::new();
        let port = fx.inspection_port().await;
        let group_id = port.parent_id.clone().unwrap();

        fx.api.remove_inspection_port(&port).await.unwrap();

        assert!(fx.api.get_inspection_port(&port).await.unwrap().is_none());
        assert!(fx.api.gateway().get_port_pair_group(&group_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_keeps_non_empty_group() {
        let fx = Fixture::new();
        let first = fx.inspection_port().await;
        let group_id = first.parent_id.clone().unwrap();
        let second = fx
            .api
            .register_inspection_port(&InspectionPort::new(fx.port(), fx.port()).with_parent(group_id.clone()))
            .await
            .unwrap();

        // lookup by (ingress, egress) only
        let by_ports = InspectionPort {
            element_id: None,
            ..first.clone()
        };
        fx.api.remove_inspection_port(&by_ports).await.unwrap();

        let group = fx.api.gateway().get_port_pair_group(&group_id).await.unwrap().unwrap();
        assert_eq!(group.port_pairs, vec![second.element_id.unwrap()]);
        assert!(fx.api.get_inspection_port(&first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_inspection_port_is_noop() {
        let fx = Fixture::new();
        let missing = InspectionPort::new(NetworkElement::with_id("a"), NetworkElement::with_id("b"));
        fx.api.remove_inspection_port(&missing).await.unwrap();
    }

    // -- chains ---------------------------------------------------------------

    #[tokio::test]
    async fn test_group_chained_elsewhere_is_conflict() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let group = chain.port_pair_groups[0].as_network_element();

        let other = fx.inspection_port().await;
        let err = fx
            .api
            .register_network_element(&[NetworkElement::with_id(other.parent_id.unwrap()), group.clone()])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains(chain.element_id.as_deref().unwrap()));
        assert!(err.to_string().starts_with("Port Pair Group Id"));
    }

    #[tokio::test]
    async fn test_register_chain_unknown_group() {
        let fx = Fixture::new();
        let err = fx
            .api
            .register_network_element(&[NetworkElement::with_id("ppg-missing")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot find Port Pair Group by id: ppg-missing!");
        assert_eq!(fx.transport.count(ResourceKind::PortChain), 0);
    }

    #[tokio::test]
    async fn test_update_chain_reverses_order() {
        let fx = Fixture::new();
        let mut group_ids = Vec::new();
        for _ in 0..3 {
            group_ids.push(fx.inspection_port().await.parent_id.unwrap());
        }
        let groups: Vec<_> = group_ids.iter().map(NetworkElement::with_id).collect();
        let chain = fx.api.register_network_element(&groups).await.unwrap();
        assert_eq!(chain.port_pair_group_ids(), group_ids);

        let reversed: Vec<_> = groups.iter().rev().cloned().collect();
        fx.api.update_network_element(&chain, &reversed).await.unwrap();

        let tree = fx.api.get_network_elements(&chain).await.unwrap();
        let expected: Vec<&str> = group_ids.iter().rev().map(String::as_str).collect();
        assert_eq!(tree.port_pair_group_ids(), expected);
        assert!(tree.port_pair_groups.iter().all(|g| g.inspection_ports.len() == 1));
    }

    #[tokio::test]
    async fn test_update_chain_with_foreign_group() {
        let fx = Fixture::new();
        let first = fx.chain().await;
        let second = fx.chain().await;

        let err = fx
            .api
            .update_network_element(&first, &[second.port_pair_groups[0].as_network_element()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // nothing was cleared
        let tree = fx.api.get_network_elements(&first).await.unwrap();
        assert_eq!(tree.port_pair_groups.len(), 1);
    }

    #[tokio::test]
    async fn test_update_chain_second_step_failure() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let groups: Vec<_> = chain.port_pair_groups.iter().map(|g| g.as_network_element()).collect();
        fx.transport
            .fail_after(ResourceKind::PortChain, Operation::Update, 1, Some(500));

        let err = fx.api.update_network_element(&chain, &groups).await.unwrap_err();
        assert_matches!(err, Error::PartialApply { ref step, .. } if step.starts_with("set Port Pair Groups"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_chain() {
        let fx = Fixture::new();
        let chain = fx.chain().await;

        fx.api.delete_network_element(&chain).await.unwrap();

        let err = fx.api.get_network_elements(&chain).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = fx.api.delete_network_element(&chain).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot find Service Function Chain by id: {}!", chain.element_id.unwrap())
        );
    }

    #[tokio::test]
    async fn test_delete_chain_failure_is_loud() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        fx.transport
            .fail_next(ResourceKind::PortChain, Operation::Delete, Some(500));

        let err = fx.api.delete_network_element(&chain).await.unwrap_err();
        assert_matches!(err, Error::ProviderCallFailure { status: Some(500), .. });
        assert!(err.to_string().contains("Exception deleting SFC"));
    }

    // -- inspection hooks -----------------------------------------------------

    #[tokio::test]
    async fn test_end_to_end() {
        let fx = Fixture::new();

        let port = fx.inspection_port().await;
        let group = NetworkElement::with_id(port.parent_id.clone().unwrap());
        let chain = fx.api.register_network_element(&[group]).await.unwrap();

        let inspected = fx.port();
        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &chain, None, None, None, None)
            .await
            .unwrap();
        assert!(!hook_id.is_empty());

        let hook = fx.api.get_inspection_hook(&hook_id).await.unwrap().unwrap();
        assert_eq!(hook.inspected_port.element_id, inspected.element_id);
        assert_eq!(hook.service_function_chain.element_id, chain.element_id);
        assert_eq!(hook.service_function_chain.flow_classifier_ids, vec![hook_id.clone()]);

        let classifier = fx.api.gateway().get_flow_classifier(&hook_id).await.unwrap().unwrap();
        assert_eq!(classifier.logical_source_port.as_deref(), port.ingress_id());
        assert_eq!(classifier.logical_destination_port.as_deref(), port.egress_id());
        assert_eq!(
            classifier.destination_ip_prefix,
            Some(format!("{}/32", inspected.port_ips[0]))
        );

        fx.api.remove_inspection_hook(&hook_id).await.unwrap();
        assert!(fx.api.get_inspection_hook(&hook_id).await.unwrap().is_none());
        assert_eq!(fx.tagged_hook(inspected.element_id.as_deref().unwrap()).await, None);

        fx.api.delete_network_element(&chain).await.unwrap();
        let err = fx.api.get_network_elements(&chain).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_second_hook_on_port_is_conflict() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let other = fx.chain().await;
        let inspected = fx.port();

        fx.api
            .install_inspection_hook(&inspected, &chain, None, None, None, None)
            .await
            .unwrap();
        let err = fx
            .api
            .install_inspection_hook(&inspected, &other, Some(5), Some(TagEncapsulation::Vlan), None, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("Found existing inspection hook"));
        assert_eq!(fx.transport.count(ResourceKind::FlowClassifier), 1);
    }

    #[tokio::test]
    async fn test_install_replaces_stale_tag() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let inspected = fx.port();
        let inspected_id = inspected.element_id.clone().unwrap();

        let port = fx.api.gateway().get_port(&inspected_id).await.unwrap().unwrap();
        fx.api.utils.set_hook_tag(&port, Some("fc-vanished")).await.unwrap();

        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &chain, None, None, None, None)
            .await
            .unwrap();
        assert_eq!(fx.tagged_hook(&inspected_id).await, Some(hook_id));
    }

    #[tokio::test]
    async fn test_install_on_unknown_chain() {
        let fx = Fixture::new();
        let err = fx
            .api
            .install_inspection_hook(&fx.port(), &NetworkElement::with_id("pc-x"), None, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot find Service Function Chain by id: pc-x!");
    }

    #[tokio::test]
    async fn test_install_on_chain_without_inspection_ports() {
        let fx = Fixture::new();
        let gateway = fx.api.gateway();
        let group = gateway.create_port_pair_group(PortPairGroup::default()).await.unwrap();
        let chain = gateway
            .create_port_chain(PortChain {
                port_pair_groups: vec![group.id.unwrap()],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = fx
            .api
            .install_inspection_hook(&fx.port(), &NetworkElement::with_id(chain.id.unwrap()), None, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fx.transport.count(ResourceKind::FlowClassifier), 0);
    }

    #[tokio::test]
    async fn test_install_attach_failure_is_partial() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        fx.transport
            .fail_next(ResourceKind::PortChain, Operation::Update, None);

        let err = fx
            .api
            .install_inspection_hook(&fx.port(), &chain, None, None, None, None)
            .await
            .unwrap_err();

        assert_matches!(err, Error::PartialApply { ref step, .. } if step.starts_with("attach Flow Classifier"));
        assert_eq!(fx.transport.count(ResourceKind::FlowClassifier), 1);
    }

    #[tokio::test]
    async fn test_get_vanished_hook_clears_tag() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let inspected = fx.port();
        let inspected_id = inspected.element_id.clone().unwrap();
        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &chain, None, None, None, None)
            .await
            .unwrap();

        let gateway = fx.api.gateway();
        let port_chain = gateway
            .get_port_chain(chain.element_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        fx.api.detach_flow_classifier(&port_chain, &hook_id).await.unwrap();
        gateway.delete_flow_classifier(&hook_id).await.unwrap();
        assert_eq!(fx.tagged_hook(&inspected_id).await, Some(hook_id.clone()));

        assert!(fx.api.get_inspection_hook(&hook_id).await.unwrap().is_none());
        assert_eq!(fx.tagged_hook(&inspected_id).await, None);
    }

    #[tokio::test]
    async fn test_remove_vanished_hook_clears_tag() {
        let fx = Fixture::new();
        let inspected = fx.port();
        let inspected_id = inspected.element_id.clone().unwrap();

        let port = fx.api.gateway().get_port(&inspected_id).await.unwrap().unwrap();
        fx.api.utils.set_hook_tag(&port, Some("fc-vanished")).await.unwrap();

        fx.api.remove_inspection_hook("fc-vanished").await.unwrap();
        assert_eq!(fx.tagged_hook(&inspected_id).await, None);
    }

    #[tokio::test]
    async fn test_hook_on_port_without_fixed_ips() {
        let fx = Fixture::new();
        let first = fx.chain().await;
        let second = fx.chain().await;

        let port_id = fx.transport.seed_port(Port::default());
        let inspected = NetworkElement::new(port_id.clone(), Vec::new(), vec!["10.0.0.50".to_string()], None);

        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &first, None, None, None, None)
            .await
            .unwrap();
        let classifier = fx.api.gateway().get_flow_classifier(&hook_id).await.unwrap().unwrap();
        assert_eq!(classifier.destination_ip_prefix.as_deref(), Some("10.0.0.50/32"));

        let hook = fx.api.get_inspection_hook(&hook_id).await.unwrap().unwrap();
        assert_eq!(hook.inspected_port.element_id.as_deref(), Some(port_id.as_str()));

        let mut update = InspectionHook::new(inspected.clone(), second.clone());
        update.hook_id = Some(hook_id.clone());
        fx.api.update_inspection_hook(&update).await.unwrap();

        fx.api.remove_inspection_hook(&hook_id).await.unwrap();
        assert_eq!(fx.tagged_hook(&port_id).await, None);
    }

    #[tokio::test]
    async fn test_update_hook_moves_classifier() {
        let fx = Fixture::new();
        let first = fx.chain().await;
        let second = fx.chain().await;
        let inspected = fx.port();

        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &first, None, None, None, None)
            .await
            .unwrap();

        let mut hook = InspectionHook::new(inspected.clone(), second.clone());
        hook.hook_id = Some(hook_id.clone());
        fx.api.update_inspection_hook(&hook).await.unwrap();

        let first_tree = fx.api.get_network_elements(&first).await.unwrap();
        let second_tree = fx.api.get_network_elements(&second).await.unwrap();
        assert!(first_tree.flow_classifier_ids.is_empty());
        assert_eq!(second_tree.flow_classifier_ids, vec![hook_id.clone()]);

        let stored = fx.api.get_inspection_hook(&hook_id).await.unwrap().unwrap();
        assert_eq!(stored.service_function_chain.element_id, second.element_id);
    }

    #[tokio::test]
    async fn test_update_hook_rejects_new_inspected_port() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let inspected = fx.port();
        let hook_id = fx
            .api
            .install_inspection_hook(&inspected, &chain, None, None, None, None)
            .await
            .unwrap();

        let mut hook = InspectionHook::new(fx.port(), chain);
        hook.hook_id = Some(hook_id);
        let err = fx.api.update_inspection_hook(&hook).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().starts_with("Cannot update Inspected Port from"));
    }

    #[tokio::test]
    async fn test_update_unknown_hook() {
        let fx = Fixture::new();
        let chain = fx.chain().await;
        let mut hook = InspectionHook::new(fx.port(), chain);
        hook.hook_id = Some("non-existing-id".into());

        let err = fx.api.update_inspection_hook(&hook).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot find Inspection Hook by id: non-existing-id!");
    }

    #[tokio::test]
    async fn test_remove_missing_hook_is_noop() {
        let fx = Fixture::new();
        fx.api.remove_inspection_hook("fc-missing").await.unwrap();
        assert!(fx.api.get_inspection_hook("fc-missing").await.unwrap().is_none());
    }

    // -- argument guards ------------------------------------------------------

    #[tokio::test]
    async fn test_null_argument_matrix() {
        let fx = Fixture::new();
        let api = &fx.api;
        let none = NetworkElement::default();
        let some = NetworkElement::with_id("x");

        let cases: Vec<(Error, &str)> = vec![
            (
                api.register_network_element(&[]).await.unwrap_err(),
                "Port Pair Group member list",
            ),
            (
                api.register_network_element(&[none.clone()]).await.unwrap_err(),
                "Port Pair Group Id",
            ),
            (
                api.update_network_element(&none, &[some.clone()]).await.unwrap_err(),
                "Port Pair Group Service Function Chain Id",
            ),
            (
                api.update_network_element(&some, &[]).await.unwrap_err(),
                "Port Pair Group update member list",
            ),
            (
                api.delete_network_element(&none).await.unwrap_err(),
                "Service Function Chain Id",
            ),
            (
                api.get_network_elements(&none).await.unwrap_err(),
                "Service Function Chain Id",
            ),
            (
                api.install_inspection_hook(&none, &some, None, None, None, None)
                    .await
                    .unwrap_err(),
                "Inspected port",
            ),
            (
                api.install_inspection_hook(&some, &none, None, None, None, None)
                    .await
                    .unwrap_err(),
                "Inspection port",
            ),
            (
                api.update_inspection_hook(&InspectionHook::new(some.clone(), ServiceFunctionChain::new("pc")))
                    .await
                    .unwrap_err(),
                "Inspection Hook Id",
            ),
            (api.remove_inspection_hook("").await.unwrap_err(), "Inspection Hook Id"),
            (api.get_inspection_hook("").await.unwrap_err(), "Inspection Hook Id"),
            (
                api.register_inspection_port(&InspectionPort::new(none.clone(), some.clone()))
                    .await
                    .unwrap_err(),
                "Ingress port",
            ),
            (
                api.register_inspection_port(&InspectionPort::new(some.clone(), none.clone()))
                    .await
                    .unwrap_err(),
                "Egress port",
            ),
        ];

        for (err, name) in cases {
            assert_eq!(err.to_string(), format!("null passed for {} !", name));
        }

        // guards run before any remote call
        assert_eq!(fx.transport.count(ResourceKind::PortChain), 0);
        assert_eq!(fx.transport.count(ResourceKind::FlowClassifier), 0);
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let fx = Fixture::new();
        let api = &fx.api;
        let a = NetworkElement::with_id("a");
        let b = NetworkElement::with_id("b");

        let err = api.remove_all_inspection_hooks(&a).await.unwrap_err();
        assert_eq!(err.to_string(), "Removing all inspection hooks is not supported in neutron SFC.");

        let err = api.get_inspection_hook_tag(&a, &b).await.unwrap_err();
        assert_eq!(err.to_string(), "Tags are not supported in neutron SFC.");
        assert!(api.set_inspection_hook_tag(&a, &b, 1).await.is_err());

        let err = api.get_inspection_hook_failure_policy(&a, &b).await.unwrap_err();
        assert_eq!(err.to_string(), "Failure policy is not supported in neutron SFC.");
        assert!(api
            .set_inspection_hook_failure_policy(&a, &b, FailurePolicy::FailOpen)
            .await
            .is_err());

        let err = api.get_inspection_hook_order(&a, &b).await.unwrap_err();
        assert_eq!(err.to_string(), "Hook order is not supported in neutron SFC.");
        assert!(api.set_inspection_hook_order(&a, &b, 1).await.is_err());

        let err = api.get_inspection_hook_by_ports(&a, &b).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("Inspected port: a and Inspection port: b"));

        let err = api.remove_inspection_hook_by_ports(&a, &b).await.unwrap_err();
        assert!(err.to_string().starts_with("Removing inspection hooks"));

        let err = api.get_network_element_by_device_owner_id("owner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        api.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_factory_memory_provider() {
        let config = RedirectionConfig {
            provider: ProviderKind::Memory,
            ..Default::default()
        };
        let api = RedirectionApiFactory::create(&config).unwrap();
        let err = api.get_network_elements(&NetworkElement::with_id("pc")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut config = RedirectionConfig::default();
        config.neutron.network_endpoint.clear();
        assert!(RedirectionApiFactory::create(&config).is_err());
    }
}
