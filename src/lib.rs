//! SFC Redirection - Neutron Service Function Chaining for traffic inspection
//!
//! Inserts an inspection chain between two endpoints of a virtual network by
//! programming Neutron networking-sfc resources, and keeps the redirection
//! abstraction (inspection ports, inspection hooks, chains) in sync with the
//! provider, which is the only source of truth.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Host orchestrator / CLI                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                SdnRedirectionApi (domain::ports)                  │
//! │  ┌─────────────────────────┐   ┌──────────────────────────────┐  │
//! │  │  NeutronSfcRedirection  │──▶│  validation / utils           │  │
//! │  │  Api (redirection::api) │   │  (guards, scans, classifier)  │  │
//! │  └────────────┬────────────┘   └──────────────┬───────────────┘  │
//! │               └───────────────┬───────────────┘                  │
//! │                    ┌──────────┴──────────┐                       │
//! │                    │     SfcGateway      │                       │
//! │                    └──────────┬──────────┘                       │
//! ├───────────────────────────────┼──────────────────────────────────┤
//! │          SfcTransport         │                                  │
//! │  ┌────────────────────────┐   │   ┌───────────────────────────┐  │
//! │  │  NeutronTransport      │◀──┴──▶│  InMemorySfcTransport     │  │
//! │  │  (REST + Keystone)     │       │  (standalone, tests)      │  │
//! │  └────────────────────────┘       └───────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: Redirection elements and the port traits
//! - [`provider`]: Neutron resources, gateway and transports
//! - [`redirection`]: The redirection API implementation
//! - [`config`]: Engine configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod domain;
pub mod error;
pub mod provider;
pub mod redirection;

// Re-export commonly used types
pub use config::{NeutronConfig, ProviderKind, RedirectionConfig, DEFAULT_HOOK_TAG_KEY};

pub use domain::elements::{
    Element, FailurePolicy, InspectionHook, InspectionPort, NetworkElement, PortPairGroupElement,
    ServiceFunctionChain, TagEncapsulation,
};

pub use domain::ports::{SdnRedirectionApi, SdnRedirectionApiRef, SfcTransport, SfcTransportRef};

pub use error::{Error, ErrorKind, Result};

pub use provider::{InMemorySfcTransport, NeutronTransport, SfcGateway, TransportFactory};

pub use redirection::{NeutronSfcRedirectionApi, RedirectionApiFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
