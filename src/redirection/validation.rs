//! Argument and lookup guards
//!
//! Every public operation runs these before its first remote call.

use crate::domain::elements::{Element, NetworkElement};
use crate::error::{Error, Result};

/// Id of a required element, rejecting a missing or empty id
pub fn require_id<'a>(element: &'a dyn Element, name: &str) -> Result<&'a str> {
    require_arg(element.element_id(), name)
}

/// A required string argument
pub fn require_arg<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidArgument(name.to_string())),
    }
}

/// A required, non-empty list argument
pub fn require_non_empty<T>(items: &[T], name: &str) -> Result<()> {
    if items.is_empty() {
        return Err(Error::InvalidArgument(name.to_string()));
    }
    Ok(())
}

/// The result of a lookup that must have resolved
pub fn require_found<T>(found: Option<T>, kind: &str, id: &str) -> Result<T> {
    found.ok_or_else(|| Error::not_found(kind, id))
}

/// Ids of a port pair group list, in order
pub fn port_pair_group_ids(groups: &[NetworkElement]) -> Result<Vec<String>> {
    groups
        .iter()
        .map(|g| require_id(g, "Port Pair Group Id").map(str::to_string))
        .collect()
}
