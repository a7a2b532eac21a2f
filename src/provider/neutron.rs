//! Neutron REST Transport
//!
//! Talks to the Neutron networking-sfc API:
//! - `/v2.0/ports`
//! - `/v2.0/sfc/{port_pairs,port_pair_groups,port_chains,flow_classifiers}`
//!
//! Requests carry an `X-Auth-Token`, either the configured one or a token
//! obtained once from Keystone v3 with password credentials.

use crate::config::NeutronConfig;
use crate::domain::ports::{ActionResponse, SfcTransport, TransportError, TransportResult};
use crate::error::Result;
use crate::provider::resources::ResourceKind;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// HTTP transport for a Neutron endpoint
pub struct NeutronTransport {
    client: reqwest::Client,
    config: NeutronConfig,
    /// Keystone token, fetched on first use
    token: RwLock<Option<String>>,
}

impl NeutronTransport {
    pub fn new(config: NeutronConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(
            "Neutron transport for {} (region {})",
            config.network_endpoint, config.region
        );

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!(
            "{}{}",
            self.config.network_endpoint.trim_end_matches('/'),
            kind.collection_path()
        )
    }

    fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), id)
    }

    async fn auth_token(&self) -> TransportResult<String> {
        if let Some(token) = &self.config.token {
            return Ok(token.clone());
        }
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Keystone v3 password authentication scoped to the configured project
    async fn authenticate(&self) -> TransportResult<String> {
        let url = format!("{}/auth/tokens", self.config.auth_url.trim_end_matches('/'));
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.config.username,
                            "domain": {"name": self.config.user_domain_name},
                            "password": self.config.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.config.project_name,
                        "domain": {"name": self.config.project_domain_name},
                    }
                }
            }
        });

        debug!("Authenticating {} against {}", self.config.username, url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TransportError::new(None, "Keystone response carried no subject token"))
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<Response> {
        let token = self.auth_token().await?;
        let response = request
            .header(AUTH_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(connection_error)?;

        if response.status() == StatusCode::UNAUTHORIZED && self.config.token.is_none() {
            warn!("Neutron rejected the cached token, re-authenticating on next call");
            *self.token.write().await = None;
        }
        Ok(response)
    }

    /// Decode a single-resource response, stripping its envelope
    async fn single(&self, kind: ResourceKind, response: Response) -> TransportResult<Option<Value>> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let status = response.status().as_u16();
        let text = response.text().await.map_err(connection_error)?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| TransportError::new(Some(status), format!("Invalid {} response: {}", kind, e)))?;
        Ok(unwrap_envelope(kind.singular_key(), body))
    }
}

fn unwrap_envelope(key: &str, body: Value) -> Option<Value> {
    match body {
        Value::Object(mut obj) => obj.remove(key).filter(|v| !v.is_null()),
        _ => None,
    }
}

fn connection_error(err: reqwest::Error) -> TransportError {
    TransportError::new(err.status().map(|s| s.as_u16()), err.to_string())
}

/// Build an error from a non-success response, preferring `NeutronError.message`
async fn error_from_response(response: Response) -> TransportError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            body.get("NeutronError")
                .or_else(|| body.get("error"))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    TransportError::new(Some(status.as_u16()), message)
}

#[async_trait]
impl SfcTransport for NeutronTransport {
    async fn create(&self, kind: ResourceKind, body: Value) -> TransportResult<Option<Value>> {
        let request = self
            .client
            .post(self.collection_url(kind))
            .json(&json!({ kind.singular_key(): body }));
        let response = self.send(request).await?;
        self.single(kind, response).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> TransportResult<Option<Value>> {
        let response = self.send(self.client.get(self.resource_url(kind, id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.single(kind, response).await
    }

    async fn list(&self, kind: ResourceKind, query: &[(String, String)]) -> TransportResult<Vec<Value>> {
        let request = self.client.get(self.collection_url(kind)).query(query);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::new(Some(status), format!("Invalid {} listing: {}", kind, e)))?;

        match unwrap_envelope(kind.collection_key(), body) {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: Value) -> TransportResult<Option<Value>> {
        let request = self
            .client
            .put(self.resource_url(kind, id))
            .json(&json!({ kind.singular_key(): body }));
        let response = self.send(request).await?;
        self.single(kind, response).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> TransportResult<ActionResponse> {
        let response = self.send(self.client.delete(self.resource_url(kind, id))).await?;
        let code = response.status().as_u16();
        if response.status().is_success() {
            return Ok(ActionResponse { code, fault: None });
        }

        let err = error_from_response(response).await;
        Ok(ActionResponse::failure(code, err.message))
    }

    fn name(&self) -> &str {
        "neutron"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(server: &MockServer, token: Option<&str>) -> NeutronConfig {
        NeutronConfig {
            network_endpoint: server.base_url(),
            auth_url: format!("{}/identity/v3", server.base_url()),
            password: "secret".into(),
            token: token.map(str::to_string),
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_wraps_envelope() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v2.0/sfc/port_pairs")
                .header("X-Auth-Token", "static-token")
                .json_body(json!({"port_pair": {"ingress": "a", "egress": "b"}}));
            then.status(201)
                .json_body(json!({"port_pair": {"id": "pp-1", "ingress": "a", "egress": "b"}}));
        });

        let transport = NeutronTransport::new(config(&server, Some("static-token"))).unwrap();
        let created = transport
            .create(ResourceKind::PortPair, json!({"ingress": "a", "egress": "b"}))
            .await
            .unwrap()
            .unwrap();

        mock.assert();
        assert_eq!(created["id"], "pp-1");
    }

    #[tokio::test]
    async fn test_get_not_found_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2.0/sfc/port_chains/missing");
            then.status(404)
                .json_body(json!({"NeutronError": {"message": "Port Chain missing could not be found"}}));
        });

        let transport = NeutronTransport::new(config(&server, Some("t"))).unwrap();
        let found = transport.get(ResourceKind::PortChain, "missing").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_passes_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2.0/ports")
                .query_param("fixed_ips", "ip_address=10.0.0.5");
            then.status(200)
                .json_body(json!({"ports": [{"id": "p-1"}]}));
        });

        let transport = NeutronTransport::new(config(&server, Some("t"))).unwrap();
        let query = vec![("fixed_ips".to_string(), "ip_address=10.0.0.5".to_string())];
        let ports = transport.list(ResourceKind::Port, &query).await.unwrap();

        mock.assert();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0]["id"], "p-1");
    }

    #[tokio::test]
    async fn test_error_carries_neutron_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/v2.0/sfc/port_pair_groups/ppg-1");
            then.status(409)
                .json_body(json!({"NeutronError": {"type": "PortPairInUse", "message": "Port Pair pp-1 in use"}}));
        });

        let transport = NeutronTransport::new(config(&server, Some("t"))).unwrap();
        let err = transport
            .update(ResourceKind::PortPairGroup, "ppg-1", json!({"port_pairs": ["pp-1"]}))
            .await
            .unwrap_err();

        assert_eq!(err.status, Some(409));
        assert_eq!(err.message, "Port Pair pp-1 in use");
    }

    #[tokio::test]
    async fn test_delete_reports_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/v2.0/sfc/port_chains/pc-1");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/v2.0/sfc/port_pairs/pp-1");
            then.status(204);
        });

        let transport = NeutronTransport::new(config(&server, Some("t"))).unwrap();

        let response = transport.delete(ResourceKind::PortChain, "pc-1").await.unwrap();
        assert_eq!(response.code, 500);
        assert_eq!(response.fault.as_deref(), Some("boom"));

        let response = transport.delete(ResourceKind::PortPair, "pp-1").await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_keystone_token_is_cached() {
        let server = MockServer::start();
        let keystone = server.mock(|when, then| {
            when.method(POST).path("/identity/v3/auth/tokens");
            then.status(201)
                .header("X-Subject-Token", "keystone-token")
                .json_body(json!({"token": {}}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/v2.0/sfc/flow_classifiers")
                .header("X-Auth-Token", "keystone-token");
            then.status(200).json_body(json!({"flow_classifiers": []}));
        });

        let transport = NeutronTransport::new(config(&server, None)).unwrap();
        transport.list(ResourceKind::FlowClassifier, &[]).await.unwrap();
        transport.list(ResourceKind::FlowClassifier, &[]).await.unwrap();

        keystone.assert();
    }

    #[tokio::test]
    async fn test_keystone_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/identity/v3/auth/tokens");
            then.status(401)
                .json_body(json!({"error": {"code": 401, "message": "The request you have made requires authentication."}}));
        });

        let transport = NeutronTransport::new(config(&server, None)).unwrap();
        let err = transport.get(ResourceKind::Port, "p-1").await.unwrap_err();

        assert_eq!(err.status, Some(401));
        assert!(err.message.contains("requires authentication"));
    }
}
