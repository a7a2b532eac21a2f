//! Provider layer
//!
//! Typed Neutron resources, the gateway the engine calls, and the transports
//! behind it:
//! - Neutron: REST API over HTTP
//! - Memory: process-local store

pub mod gateway;
pub mod memory;
pub mod neutron;
pub mod resources;

pub use gateway::SfcGateway;
pub use memory::InMemorySfcTransport;
pub use neutron::NeutronTransport;
pub use resources::*;

use crate::config::{NeutronConfig, ProviderKind};
use crate::domain::ports::SfcTransportRef;
use crate::error::Result;
use std::sync::Arc;

/// Factory for creating provider transports
pub struct TransportFactory;

impl TransportFactory {
    pub fn create(kind: ProviderKind, neutron: &NeutronConfig) -> Result<SfcTransportRef> {
        match kind {
            ProviderKind::Neutron => Ok(Arc::new(NeutronTransport::new(neutron.clone())?)),
            ProviderKind::Memory => Ok(Arc::new(InMemorySfcTransport::new())),
        }
    }
}
