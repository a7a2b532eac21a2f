//! Domain layer - Redirection elements and port definitions
//!
//! This module defines the elements exchanged with the host and the core
//! traits (ports) that adapters implement, following hexagonal architecture
//! principles.

pub mod elements;
pub mod ports;

pub use elements::*;
pub use ports::*;
