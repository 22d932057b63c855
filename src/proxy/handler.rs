//! Relay request handler
//!
//! Re-targets incoming requests at the rotator's origin and sends them through the
//! rotating client.

use std::fmt::Display;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::HOST;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, RotatorError};
use crate::router::{is_upgrade_request, RotatingClient};

/// Relay request handler
pub struct RelayHandler {
    client: RotatingClient,
    origin: String,
}

impl RelayHandler {
    pub fn new(client: RotatingClient) -> Self {
        let origin = client.manager().target().to_string();
        Self { client, origin }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Handle an incoming relay request
    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Display,
    {
        if req.method() == Method::CONNECT {
            return Err(RotatorError::InvalidRequest(
                "CONNECT tunnels are not supported".into(),
            ));
        }
        if is_upgrade_request(req.headers()) {
            return Err(RotatorError::UpgradeNotSupported);
        }

        let url = self.upstream_url(&req)?;

        let (parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| RotatorError::InvalidRequest(format!("Failed to read body: {}", e)))?
            .to_bytes();

        let mut request = reqwest::Request::new(parts.method, url);
        *request.headers_mut() = forwarded_headers(&parts.headers);
        if !body_bytes.is_empty() {
            *request.body_mut() = Some(body_bytes.into());
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        debug!("Upstream responded with {}", status);

        let headers = forwarded_headers(response.headers());
        let body = response.bytes().await?;

        let mut builder = Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        builder
            .body(Full::new(body))
            .map_err(|e| RotatorError::Http(format!("Failed to build response: {}", e)))
    }

    /// Origin URL for the request's path and query
    fn upstream_url<B>(&self, req: &Request<B>) -> Result<Url> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Ok(Url::parse(&format!("{}{}", self.origin, path_and_query))?)
    }
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    response
}

/// Copy headers, except hop-by-hop headers and `Host`
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name != HOST && !is_hop_by_hop_header(name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
