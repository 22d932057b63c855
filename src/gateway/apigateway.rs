//! API Gateway v2 control-plane client
//!
//! Talks to `https://apigateway.{region}.amazonaws.com` over the public REST API,
//! signing every call with SigV4.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::sigv4::{self, SigningRequest};
use super::{
    CorsPolicy, Credentials, GatewayClient, GatewayConnector, GatewayPage, GatewayProtocol,
    GatewaySpec, GatewaySummary, ProviderResult,
};
use crate::error::{
    ProviderError, CONFLICT_CODE, INVALID_RESPONSE_CODE, TOO_MANY_REQUESTS_CODE,
};

const ERROR_TYPE_HEADER: &str = "x-amzn-ErrorType";

/// Opens [`ApiGatewayClient`] connections with a fixed set of credentials
#[derive(Debug, Clone)]
pub struct ApiGatewayConnector {
    credentials: Arc<Credentials>,
    http: reqwest::Client,
    endpoint_override: Option<Url>,
}

impl ApiGatewayConnector {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            http: reqwest::Client::new(),
            endpoint_override: None,
        }
    }

    /// Send every region's calls to `endpoint` instead of the public control plane
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint_override = Some(endpoint);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Control-plane base URL for `region`
    pub fn endpoint_for(&self, region: &str) -> ProviderResult<Url> {
        match &self.endpoint_override {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(&format!("https://apigateway.{}.amazonaws.com", region))
                .map_err(|e| ProviderError::transport(format!("invalid region {}: {}", region, e))),
        }
    }
}

#[async_trait]
impl GatewayConnector for ApiGatewayConnector {
    async fn connect(&self, region: &str) -> ProviderResult<Box<dyn GatewayClient>> {
        Ok(Box::new(ApiGatewayClient {
            region: region.to_string(),
            endpoint: self.endpoint_for(region)?,
            credentials: self.credentials.clone(),
            http: self.http.clone(),
        }))
    }
}

/// Connection to one region's API Gateway v2 control plane
pub struct ApiGatewayClient {
    region: String,
    endpoint: Url,
    credentials: Arc<Credentials>,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateApiRequest<'a> {
    name: &'a str,
    protocol_type: GatewayProtocol,
    target: &'a str,
    cors_configuration: &'a CorsPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageRequest<'a> {
    stage_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateApiResponse {
    api_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetApisResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    api_id: String,
    #[serde(default)]
    name: String,
}

impl ApiGatewayClient {
    /// Send a signed request and return the raw response body on success
    #[instrument(skip(self, query, body), fields(region = %self.region))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> ProviderResult<Bytes> {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        let query_string = sigv4::canonical_query(query);
        if query_string.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&query_string));
        }

        let host = host_header(&url)?;
        let payload = body.unwrap_or_default();
        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            Utc::now(),
            &SigningRequest {
                method: method.as_str(),
                host: &host,
                path,
                query,
                payload: &payload,
            },
        );

        debug!("{} {}", method, url);

        let has_body = !payload.is_empty();
        let mut builder = self.http.request(method, url);
        for (name, value) in signed.pairs() {
            builder = builder.header(name, value);
        }
        if has_body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let error_type = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(bytes)
        } else {
            Err(parse_error(status, error_type.as_deref(), &bytes))
        }
    }
}

#[async_trait]
impl GatewayClient for ApiGatewayClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_gateway(&self, spec: &GatewaySpec) -> ProviderResult<String> {
        let body = to_json(&CreateApiRequest {
            name: &spec.name,
            protocol_type: spec.protocol,
            target: &spec.target,
            cors_configuration: &spec.cors,
        })?;
        let bytes = self.send(Method::POST, "/v2/apis", &[], Some(body)).await?;
        let created: CreateApiResponse = from_json(&bytes)?;
        Ok(created.api_id)
    }

    async fn create_stage(&self, gateway_id: &str, stage_name: &str) -> ProviderResult<()> {
        let path = format!("/v2/apis/{}/stages", sigv4::uri_encode(gateway_id));
        let body = to_json(&StageRequest { stage_name })?;
        self.send(Method::POST, &path, &[], Some(body)).await?;
        Ok(())
    }

    async fn create_deployment(&self, gateway_id: &str, stage_name: &str) -> ProviderResult<()> {
        let path = format!("/v2/apis/{}/deployments", sigv4::uri_encode(gateway_id));
        let body = to_json(&StageRequest { stage_name })?;
        self.send(Method::POST, &path, &[], Some(body)).await?;
        Ok(())
    }

    async fn list_gateways(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> ProviderResult<GatewayPage> {
        let page_size = page_size.to_string();
        let mut query = vec![("maxResults", page_size.as_str())];
        if let Some(token) = page_token {
            query.push(("nextToken", token));
        }

        let bytes = self.send(Method::GET, "/v2/apis", &query, None).await?;
        let listed: GetApisResponse = from_json(&bytes)?;

        Ok(GatewayPage {
            items: listed
                .items
                .into_iter()
                .map(|item| GatewaySummary {
                    id: item.api_id,
                    name: item.name,
                })
                .collect(),
            next_token: listed.next_token.filter(|t| !t.is_empty()),
        })
    }

    async fn delete_gateway(&self, gateway_id: &str) -> ProviderResult<()> {
        let path = format!("/v2/apis/{}", sigv4::uri_encode(gateway_id));
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }
}

/// Host header value reqwest will send for `url`
fn host_header(url: &Url) -> ProviderResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ProviderError::transport(format!("endpoint has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn to_json<T: Serialize>(value: &T) -> ProviderResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProviderError::transport(e.to_string()))
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> ProviderResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::new(INVALID_RESPONSE_CODE, None, e.to_string()))
}

/// Build a provider error from a failed response
///
/// The code comes from the `x-amzn-ErrorType` header, then the body's `__type`,
/// then the HTTP status.
fn parse_error(status: u16, error_type: Option<&str>, body: &[u8]) -> ProviderError {
    let json: Option<serde_json::Value> = serde_json::from_slice(body).ok();

    let code = error_type
        .map(|t| t.split(':').next().unwrap_or(t).trim().to_string())
        .filter(|c| !c.is_empty())
        .or_else(|| {
            json.as_ref()
                .and_then(|j| j.get("__type"))
                .and_then(|v| v.as_str())
                .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        })
        .unwrap_or_else(|| code_for_status(status).to_string());

    let message = json
        .as_ref()
        .and_then(|j| j.get("message").or_else(|| j.get("Message")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    ProviderError::new(code, Some(status), message)
}

fn code_for_status(status: u16) -> &'static str {
    match status {
        400 => "BadRequestException",
        403 => "AccessDeniedException",
        404 => "NotFoundException",
        409 => CONFLICT_CODE,
        429 => TOO_MANY_REQUESTS_CODE,
        _ => "UnknownError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_prefers_header() {
        let err = parse_error(
            409,
            Some("ConflictException:http://internal.amazon.com/coral/"),
            br#"{"message":"Stage already exists"}"#,
        );
        assert!(err.is_conflict());
        assert_eq!(err.status, Some(409));
        assert_eq!(err.message, "Stage already exists");
    }

    #[test]
    fn test_parse_error_body_type() {
        let err = parse_error(
            400,
            None,
            br#"{"__type":"com.amazon#TooManyRequestsException","Message":"slow down"}"#,
        );
        assert!(err.is_rate_limited());
        assert_eq!(err.message, "slow down");
    }

    #[test]
    fn test_parse_error_falls_back_to_status() {
        let err = parse_error(429, None, b"Too Many Requests");
        assert!(err.is_rate_limited());
        assert_eq!(err.message, "Too Many Requests");

        let err = parse_error(500, None, b"");
        assert_eq!(err.code, "UnknownError");
    }

    #[test]
    fn test_default_endpoint_per_region() {
        let connector = ApiGatewayConnector::new(Credentials::new("id", "secret"));
        assert_eq!(
            connector.endpoint_for("eu-west-3").unwrap().as_str(),
            "https://apigateway.eu-west-3.amazonaws.com/"
        );

        let endpoint = Url::parse("http://127.0.0.1:4566").unwrap();
        let connector = connector.with_endpoint(endpoint.clone());
        assert_eq!(connector.endpoint_for("eu-west-3").unwrap(), endpoint);
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        let url = Url::parse("http://127.0.0.1:4566/v2/apis").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:4566");

        let url = Url::parse("https://apigateway.us-east-1.amazonaws.com:443/").unwrap();
        assert_eq!(host_header(&url).unwrap(), "apigateway.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_create_request_body() {
        let spec = GatewaySpec::http_proxy("https://example.com");
        let body = to_json(&CreateApiRequest {
            name: &spec.name,
            protocol_type: spec.protocol,
            target: &spec.target,
            cors_configuration: &spec.cors,
        })
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["name"], "Async IP Rotator");
        assert_eq!(json["protocolType"], "HTTP");
        assert_eq!(json["target"], "https://example.com");
        assert_eq!(json["corsConfiguration"]["allowMethods"][0], "*");
    }
}
