//! Lookups and builders shared by the redirection operations
//!
//! All lookups go to the provider; nothing is cached between calls. Scans
//! over port pairs, groups and chains are linear.

use crate::domain::elements::{InspectionPort, NetworkElement, PortPairGroupElement, ServiceFunctionChain};
use crate::error::{Error, Result};
use crate::provider::gateway::SfcGateway;
use crate::provider::resources::{FlowClassifier, Port, PortChain, PortFilter, PortPair, PortPairGroup};
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Provider lookups used by the redirection API
pub struct RedirectionUtils {
    gateway: SfcGateway,
    hook_tag_key: String,
}

impl RedirectionUtils {
    /// Helpers over `gateway`, tagging ports under `hook_tag_key`
    pub fn new(gateway: SfcGateway, hook_tag_key: impl Into<String>) -> Self {
        Self {
            gateway,
            hook_tag_key: hook_tag_key.into(),
        }
    }

    /// Binding-profile key holding the hook id
    pub fn hook_tag_key(&self) -> &str {
        &self.hook_tag_key
    }

    // =========================================================================
    // Tree Rehydration
    // =========================================================================

    async fn fetch_network_element(&self, port_id: Option<&str>, parent_id: &str) -> Result<Option<NetworkElement>> {
        let Some(port_id) = port_id else {
            return Ok(None);
        };
        match self.gateway.get_port(port_id).await? {
            Some(port) => Ok(Some(network_element_from_port(&port, Some(parent_id)))),
            None => {
                error!("Port {} referenced by port pair {} does not exist", port_id, parent_id);
                Ok(None)
            }
        }
    }

    /// Inspection port for a provider pair, with its ingress and egress ports
    pub async fn fetch_inspection_port(&self, pair: &PortPair, group_id: Option<String>) -> Result<InspectionPort> {
        let pair_id = pair.id.as_deref().unwrap_or_default();
        Ok(InspectionPort {
            element_id: pair.id.clone(),
            parent_id: group_id,
            ingress_port: self.fetch_network_element(pair.ingress.as_deref(), pair_id).await?,
            egress_port: self.fetch_network_element(pair.egress.as_deref(), pair_id).await?,
        })
    }

    /// Walk chain, groups, pairs and ports in chain order.
    ///
    /// Referenced resources that no longer exist are logged and skipped.
    pub async fn fetch_chain_tree(&self, chain: &PortChain) -> Result<ServiceFunctionChain> {
        let chain_id = chain.id.clone().unwrap_or_default();
        let mut tree = ServiceFunctionChain::new(chain_id.clone());
        tree.flow_classifier_ids = chain.flow_classifiers.clone();

        for group_id in &chain.port_pair_groups {
            let Some(group) = self.gateway.get_port_pair_group(group_id).await? else {
                error!("Port pair group {} not found for port chain {}", group_id, chain_id);
                continue;
            };

            let mut element = PortPairGroupElement::new(group_id.clone());
            element.service_function_chain_id = Some(chain_id.clone());

            for pair_id in &group.port_pairs {
                let Some(pair) = self.gateway.get_port_pair(pair_id).await? else {
                    error!("Port pair {} not found for port pair group {}", pair_id, group_id);
                    continue;
                };
                let port = self.fetch_inspection_port(&pair, Some(group_id.clone())).await?;
                element.inspection_ports.push(port);
            }

            tree.port_pair_groups.push(element);
        }

        Ok(tree)
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Port pair with exactly these ingress and egress ids
    pub async fn find_port_pair_by_ports(&self, ingress: Option<&str>, egress: Option<&str>) -> Result<Option<PortPair>> {
        let pairs = self.gateway.list_port_pairs().await?;
        Ok(pairs
            .into_iter()
            .find(|pp| pp.ingress.as_deref() == ingress && pp.egress.as_deref() == egress))
    }

    /// Port pair by id, falling back to the (ingress, egress) scan
    pub async fn find_port_pair_for_inspection_port(&self, inspection_port: &InspectionPort) -> Result<Option<PortPair>> {
        if let Some(id) = inspection_port.element_id.as_deref().filter(|id| !id.is_empty()) {
            if let Some(pair) = self.gateway.get_port_pair(id).await? {
                return Ok(Some(pair));
            }
            warn!("Port pair {} not found by id, trying by ingress and egress", id);
        }

        let (ingress, egress) = (inspection_port.ingress_id(), inspection_port.egress_id());
        if ingress.is_none() && egress.is_none() {
            return Ok(None);
        }
        self.find_port_pair_by_ports(ingress, egress).await
    }

    /// Group listing this port pair
    pub async fn find_containing_group(&self, port_pair_id: &str) -> Result<Option<PortPairGroup>> {
        let groups = self.gateway.list_port_pair_groups().await?;
        Ok(groups
            .into_iter()
            .find(|g| g.port_pairs.iter().any(|id| id == port_pair_id)))
    }

    /// Chain listing this port pair group
    pub async fn find_containing_chain(&self, port_pair_group_id: &str) -> Result<Option<PortChain>> {
        let chains = self.gateway.list_port_chains().await?;
        Ok(chains
            .into_iter()
            .find(|c| c.port_pair_groups.iter().any(|id| id == port_pair_group_id)))
    }

    /// Chain the flow classifier is attached to
    pub async fn find_chain_for_flow_classifier(&self, flow_classifier_id: &str) -> Result<Option<PortChain>> {
        let chains = self.gateway.list_port_chains().await?;
        Ok(chains
            .into_iter()
            .find(|c| c.flow_classifiers.iter().any(|id| id == flow_classifier_id)))
    }

    /// Check that every group exists and is not chained to another chain
    pub async fn validate_port_pair_groups(&self, group_ids: &[String], allowed_chain_id: Option<&str>) -> Result<()> {
        for id in group_ids {
            if self.gateway.get_port_pair_group(id).await?.is_none() {
                return Err(Error::not_found("Port Pair Group", id.as_str()));
            }
        }

        let chains = self.gateway.list_port_chains().await?;
        for id in group_ids {
            let owner = chains
                .iter()
                .filter(|c| allowed_chain_id.map_or(true, |allowed| c.id.as_deref() != Some(allowed)))
                .find(|c| c.port_pair_groups.contains(id));

            if let Some(chain) = owner {
                return Err(Error::Conflict(format!(
                    "Port Pair Group Id {} is already chained to SFC Id : {} ",
                    id,
                    chain.id.as_deref().unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Hook Tags
    // =========================================================================

    pub fn hook_tag<'a>(&self, port: &'a Port) -> Option<&'a str> {
        port.profile_value(&self.hook_tag_key)
    }

    /// Set or clear the hook tag in a port's binding profile
    pub async fn set_hook_tag(&self, port: &Port, hook_id: Option<&str>) -> Result<Port> {
        let port_id = port.id.as_deref().unwrap_or_default();
        let mut profile = port.profile.clone().unwrap_or_default();
        match hook_id {
            Some(id) => {
                profile.insert(self.hook_tag_key.clone(), Value::String(id.to_string()));
            }
            None => {
                profile.remove(&self.hook_tag_key);
            }
        }

        let change = Port {
            profile: Some(profile),
            ..Default::default()
        };
        self.gateway.update_port(port_id, change).await
    }

    /// Live hook id tagged on a port.
    ///
    /// A tag naming a flow classifier that no longer exists is cleared.
    pub async fn find_hook_on_port(&self, port: &Port) -> Result<Option<String>> {
        let Some(hook_id) = self.hook_tag(port) else {
            return Ok(None);
        };

        if self.gateway.get_flow_classifier(hook_id).await?.is_some() {
            return Ok(Some(hook_id.to_string()));
        }

        warn!(
            "Port {} is tagged with vanished inspection hook {}, clearing tag",
            port.id.as_deref().unwrap_or_default(),
            hook_id
        );
        self.set_hook_tag(port, None).await?;
        Ok(None)
    }

    /// Inspected port carrying the tag of this classifier.
    ///
    /// Ports at the classifier's destination address are checked first. The
    /// address may come from the caller rather than the port itself, so a
    /// miss falls back to scanning every port.
    pub async fn find_tagged_port(&self, flow_classifier: &FlowClassifier) -> Result<Option<Port>> {
        let Some(hook_id) = flow_classifier.id.as_deref() else {
            return Ok(None);
        };

        if let Some(address) = flow_classifier.destination_address() {
            let ports = self.gateway.list_ports(&PortFilter::by_ip_address(address)).await?;
            if let Some(port) = ports.into_iter().find(|p| self.hook_tag(p) == Some(hook_id)) {
                return Ok(Some(port));
            }
            debug!("No port at {} is tagged with inspection hook {}, scanning all ports", address, hook_id);
        }

        self.find_port_tagged_with(hook_id).await
    }

    /// Scan all ports for the tag of `hook_id`
    pub async fn find_port_tagged_with(&self, hook_id: &str) -> Result<Option<Port>> {
        let ports = self.gateway.list_ports(&PortFilter::default()).await?;
        Ok(ports.into_iter().find(|p| self.hook_tag(p) == Some(hook_id)))
    }

    /// Clear the tag of a hook whose flow classifier no longer exists
    pub async fn clear_vanished_hook_tag(&self, hook_id: &str) -> Result<Option<Port>> {
        let Some(port) = self.find_port_tagged_with(hook_id).await? else {
            return Ok(None);
        };

        warn!(
            "Port {} is tagged with vanished inspection hook {}, clearing tag",
            port.id.as_deref().unwrap_or_default(),
            hook_id
        );
        self.set_hook_tag(&port, None).await.map(Some)
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn network_element_from_port(port: &Port, parent_id: Option<&str>) -> NetworkElement {
    NetworkElement {
        element_id: port.id.clone(),
        mac_addresses: port.mac_address.iter().cloned().collect(),
        port_ips: port.ip_addresses().map(str::to_string).collect(),
        parent_id: parent_id.map(str::to_string),
    }
}

/// Chain element listing group ids only
pub fn shallow_chain(chain: &PortChain) -> ServiceFunctionChain {
    let chain_id = chain.id.clone().unwrap_or_default();
    ServiceFunctionChain {
        element_id: Some(chain_id.clone()),
        port_pair_groups: chain
            .port_pair_groups
            .iter()
            .map(|id| PortPairGroupElement {
                element_id: Some(id.clone()),
                inspection_ports: Vec::new(),
                service_function_chain_id: Some(chain_id.clone()),
            })
            .collect(),
        flow_classifier_ids: chain.flow_classifiers.clone(),
    }
}

/// Classifier steering traffic of the inspected port into `chain`.
///
/// Logical ports are the chain's first ingress and last egress; the match
/// target is the inspected port's first address, provider ports first.
pub fn build_flow_classifier(
    chain: &ServiceFunctionChain,
    inspected_port: &Port,
    fallback_ips: &[String],
) -> Result<FlowClassifier> {
    let chain_id = chain.element_id.as_deref().unwrap_or_default();
    let no_ports = || Error::Conflict(format!("Service Function Chain {} has no inspection ports", chain_id));

    let source = chain
        .first_ingress()
        .and_then(|p| p.element_id.clone())
        .ok_or_else(no_ports)?;
    let destination = chain
        .last_egress()
        .and_then(|p| p.element_id.clone())
        .ok_or_else(no_ports)?;

    let address = inspected_port
        .ip_addresses()
        .chain(fallback_ips.iter().map(String::as_str))
        .find_map(|ip| ip.parse::<IpAddr>().ok());

    let (ethertype, prefix) = match address {
        Some(IpAddr::V4(ip)) => ("IPv4", Some(format!("{}/32", ip))),
        Some(IpAddr::V6(ip)) => ("IPv6", Some(format!("{}/128", ip))),
        None => ("IPv4", None),
    };

    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

    Ok(FlowClassifier {
        name: Some(format!("sfc-hook-{}", suffix)),
        description: Some(format!(
            "Inspection hook for port {}",
            inspected_port.id.as_deref().unwrap_or_default()
        )),
        ethertype: Some(ethertype.to_string()),
        destination_ip_prefix: prefix,
        logical_source_port: Some(source),
        logical_destination_port: Some(destination),
        ..Default::default()
    })
}
