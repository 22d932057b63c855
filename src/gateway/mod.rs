//! Gateway provider control plane
//!
//! The rotation core only talks to the provider through the [`GatewayConnector`] and
//! [`GatewayClient`] traits:
//! - `GatewayConnector` is the credential-bearing capability that opens a connection
//!   to one region's control plane
//! - `GatewayClient` is that per-region connection, released when dropped
//!
//! [`ApiGatewayConnector`] is the production implementation on top of the
//! API Gateway v2 REST API.

pub mod apigateway;
pub mod sigv4;

#[cfg(test)]
pub(crate) mod fake;

pub use apigateway::{ApiGatewayClient, ApiGatewayConnector};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;

/// Display name given to every gateway this tool creates, used to find them again
pub const GATEWAY_NAME: &str = "Async IP Rotator";

/// Name of the deployment stage every gateway is published under
pub const STAGE_NAME: &str = "ProxyStage";

/// Number of gateways requested per listing page
pub const LIST_PAGE_SIZE: u32 = 100;

/// Provider result alias
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Access key pair used to authenticate against the provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Cross-origin policy attached to created gateways
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

impl CorsPolicy {
    /// Any origin, any method, any header
    pub fn allow_all() -> Self {
        let any = vec!["*".to_string()];
        Self {
            allow_origins: any.clone(),
            allow_methods: any.clone(),
            allow_headers: any,
        }
    }
}

/// Wire protocol of a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayProtocol {
    Http,
}

/// Parameters for creating one proxy gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySpec {
    pub name: String,
    pub protocol: GatewayProtocol,
    pub target: String,
    pub cors: CorsPolicy,
}

impl GatewaySpec {
    /// Spec for an HTTP proxy gateway in front of `target`, named so sweeps can find it
    pub fn http_proxy(target: impl Into<String>) -> Self {
        Self {
            name: GATEWAY_NAME.to_string(),
            protocol: GatewayProtocol::Http,
            target: target.into(),
            cors: CorsPolicy::allow_all(),
        }
    }
}

/// One gateway as returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySummary {
    pub id: String,
    pub name: String,
}

/// One page of a gateway listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayPage {
    pub items: Vec<GatewaySummary>,
    pub next_token: Option<String>,
}

/// Connection to one region's gateway control plane
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Region this connection is bound to
    fn region(&self) -> &str;

    /// Create a gateway and return its identifier
    async fn create_gateway(&self, spec: &GatewaySpec) -> ProviderResult<String>;

    /// Create a deployment stage; fails with a conflict if it already exists
    async fn create_stage(&self, gateway_id: &str, stage_name: &str) -> ProviderResult<()>;

    /// Publish the gateway's configuration to a stage
    async fn create_deployment(&self, gateway_id: &str, stage_name: &str) -> ProviderResult<()>;

    /// Fetch one page of gateways
    async fn list_gateways(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> ProviderResult<GatewayPage>;

    /// Delete a gateway; fails with a rate-limit error when throttled
    async fn delete_gateway(&self, gateway_id: &str) -> ProviderResult<()>;
}

/// Opens authenticated per-region connections to the control plane
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, region: &str) -> ProviderResult<Box<dyn GatewayClient>>;
}
