//! In-Memory SFC Transport
//!
//! Process-local stand-in for a Neutron SFC endpoint. Resources are kept as
//! JSON objects in insertion order, ids are assigned on create, and deletes of
//! resources still referenced by another resource are refused with 409 the way
//! Neutron does. Failures can be injected per (kind, operation) for tests.

use crate::domain::ports::{ActionResponse, SfcTransport, TransportError, TransportResult};
use crate::error::Operation;
use crate::provider::resources::{Port, ResourceKind};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_PROJECT_ID: &str = "memory-project";

#[derive(Debug, Clone)]
struct InjectedFailure {
    kind: ResourceKind,
    operation: Operation,
    /// Matching calls to let through first
    skip: usize,
    status: Option<u16>,
}

/// In-memory SFC transport
pub struct InMemorySfcTransport {
    stores: RwLock<HashMap<ResourceKind, IndexMap<String, Value>>>,
    failures: Mutex<Vec<InjectedFailure>>,
    next_chain_id: AtomicU64,
    project_id: String,
}

impl InMemorySfcTransport {
    pub fn new() -> Self {
        Self::with_project(DEFAULT_PROJECT_ID)
    }

    /// Create a transport stamping resources with the given project
    pub fn with_project(project_id: impl Into<String>) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            next_chain_id: AtomicU64::new(1),
            project_id: project_id.into(),
        }
    }

    /// Insert a port as if it had been created out of band; returns its id
    pub fn seed_port(&self, port: Port) -> String {
        let id = port.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut value = serde_json::to_value(&port).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Some(obj) = value.as_object_mut() {
            obj.insert("id".into(), Value::String(id.clone()));
        }
        self.stores
            .write()
            .entry(ResourceKind::Port)
            .or_default()
            .insert(id.clone(), value);
        id
    }

    /// Make the next matching call fail; `None` simulates a lost connection
    pub fn fail_next(&self, kind: ResourceKind, operation: Operation, status: Option<u16>) {
        self.fail_after(kind, operation, 0, status);
    }

    /// Let `skip` matching calls succeed, then fail the next one
    pub fn fail_after(&self, kind: ResourceKind, operation: Operation, skip: usize, status: Option<u16>) {
        self.failures.lock().push(InjectedFailure {
            kind,
            operation,
            skip,
            status,
        });
    }

    /// Number of stored resources of a kind
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.stores.read().get(&kind).map_or(0, |s| s.len())
    }

    /// Stored objects of a kind, in creation order
    pub fn snapshot(&self, kind: ResourceKind) -> Vec<Value> {
        self.stores
            .read()
            .get(&kind)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn take_failure(&self, kind: ResourceKind, operation: Operation) -> Option<InjectedFailure> {
        let mut failures = self.failures.lock();
        let pos = failures
            .iter()
            .position(|f| f.kind == kind && f.operation == operation)?;
        if failures[pos].skip > 0 {
            failures[pos].skip -= 1;
            return None;
        }
        Some(failures.remove(pos))
    }

    fn check_failure(&self, kind: ResourceKind, operation: Operation) -> TransportResult<()> {
        match self.take_failure(kind, operation) {
            Some(failure) => Err(TransportError::new(
                failure.status,
                format!("injected {} {} failure", operation, kind),
            )),
            None => Ok(()),
        }
    }

    /// Kind and id of a resource still referencing `id`, if any
    fn referenced_by(
        stores: &HashMap<ResourceKind, IndexMap<String, Value>>,
        kind: ResourceKind,
        id: &str,
    ) -> Option<(ResourceKind, String)> {
        let (owner, field) = match kind {
            ResourceKind::PortPair => (ResourceKind::PortPairGroup, "port_pairs"),
            ResourceKind::PortPairGroup => (ResourceKind::PortChain, "port_pair_groups"),
            ResourceKind::FlowClassifier => (ResourceKind::PortChain, "flow_classifiers"),
            _ => return None,
        };

        stores.get(&owner)?.iter().find_map(|(owner_id, value)| {
            let refs = value.get(field)?.as_array()?;
            refs.iter()
                .any(|r| r.as_str() == Some(id))
                .then(|| (owner, owner_id.clone()))
        })
    }
}

impl Default for InMemorySfcTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_query(value: &Value, query: &[(String, String)]) -> bool {
    query.iter().all(|(key, expected)| {
        if key == "fixed_ips" {
            let Some(address) = expected.strip_prefix("ip_address=") else {
                return false;
            };
            return value
                .get("fixed_ips")
                .and_then(Value::as_array)
                .map_or(false, |ips| {
                    ips.iter()
                        .any(|ip| ip.get("ip_address").and_then(Value::as_str) == Some(address))
                });
        }
        value.get(key).and_then(Value::as_str) == Some(expected.as_str())
    })
}

fn into_object(kind: ResourceKind, body: Value) -> TransportResult<Map<String, Value>> {
    match body {
        Value::Object(obj) => Ok(obj),
        other => Err(TransportError::new(
            Some(400),
            format!("Invalid {} body: expected object, got {}", kind, other),
        )),
    }
}

#[async_trait]
impl SfcTransport for InMemorySfcTransport {
    async fn create(&self, kind: ResourceKind, body: Value) -> TransportResult<Option<Value>> {
        self.check_failure(kind, Operation::Create)?;

        let mut obj = into_object(kind, body)?;
        let id = Uuid::new_v4().to_string();
        obj.insert("id".into(), Value::String(id.clone()));
        obj.insert("project_id".into(), Value::String(self.project_id.clone()));
        obj.insert("tenant_id".into(), Value::String(self.project_id.clone()));

        match kind {
            ResourceKind::PortPairGroup => {
                obj.entry("port_pairs").or_insert_with(|| Value::Array(vec![]));
                obj.insert("port_pair_group_parameters".into(), serde_json::json!({"lb_fields": []}));
            }
            ResourceKind::PortChain => {
                obj.entry("port_pair_groups").or_insert_with(|| Value::Array(vec![]));
                obj.entry("flow_classifiers").or_insert_with(|| Value::Array(vec![]));
                let chain_id = self.next_chain_id.fetch_add(1, Ordering::Relaxed);
                obj.insert("chain_id".into(), Value::from(chain_id));
                obj.insert("chain_parameters".into(), serde_json::json!({"correlation": "mpls"}));
            }
            _ => {}
        }

        let value = Value::Object(obj);
        self.stores
            .write()
            .entry(kind)
            .or_default()
            .insert(id.clone(), value.clone());

        debug!("memory: created {} {}", kind, id);
        Ok(Some(value))
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> TransportResult<Option<Value>> {
        self.check_failure(kind, Operation::Get)?;
        Ok(self.stores.read().get(&kind).and_then(|s| s.get(id)).cloned())
    }

    async fn list(&self, kind: ResourceKind, query: &[(String, String)]) -> TransportResult<Vec<Value>> {
        self.check_failure(kind, Operation::List)?;
        Ok(self
            .stores
            .read()
            .get(&kind)
            .map(|s| s.values().filter(|v| matches_query(v, query)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: Value) -> TransportResult<Option<Value>> {
        self.check_failure(kind, Operation::Update)?;

        let changes = into_object(kind, body)?;
        let mut stores = self.stores.write();
        let existing = stores
            .get_mut(&kind)
            .and_then(|s| s.get_mut(id))
            .ok_or_else(|| TransportError::new(Some(404), format!("{} {} could not be found.", kind, id)))?;

        if let Some(obj) = existing.as_object_mut() {
            for (key, value) in changes {
                if key != "id" {
                    obj.insert(key, value);
                }
            }
        }

        debug!("memory: updated {} {}", kind, id);
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> TransportResult<ActionResponse> {
        if let Some(failure) = self.take_failure(kind, Operation::Delete) {
            return match failure.status {
                Some(code) => Ok(ActionResponse::failure(code, format!("injected Delete {} failure", kind))),
                None => Err(TransportError::new(None, format!("injected Delete {} failure", kind))),
            };
        }

        let mut stores = self.stores.write();
        if let Some((owner, owner_id)) = Self::referenced_by(&stores, kind, id) {
            return Ok(ActionResponse::failure(
                409,
                format!("{} {} is in use by {} {}.", kind, id, owner, owner_id),
            ));
        }

        let removed = stores.get_mut(&kind).and_then(|s| s.shift_remove(id));
        match removed {
            Some(_) => {
                debug!("memory: deleted {} {}", kind, id);
                Ok(ActionResponse::success())
            }
            None => Ok(ActionResponse::failure(404, format!("{} {} could not be found.", kind, id))),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
