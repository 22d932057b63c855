use std::sync::Arc;

use reqwest::header::{HeaderMap, HOST, UPGRADE};
use reqwest::{Method, Request, RequestBuilder, Response};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, RotatorError};
use crate::gateway::STAGE_NAME;
use crate::models::EndpointRecord;
use crate::rotation::RotationManager;

/// HTTP client that sends every request through the next rotating endpoint
///
/// Websocket upgrade requests skip rotation and go to their original URL.
#[derive(Clone)]
pub struct RotatingClient {
    manager: Arc<RotationManager>,
    http: reqwest::Client,
}

impl RotatingClient {
    pub fn new(manager: Arc<RotationManager>) -> Self {
        Self::with_http_client(manager, reqwest::Client::new())
    }

    pub fn with_http_client(manager: Arc<RotationManager>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }

    pub fn manager(&self) -> &Arc<RotationManager> {
        &self.manager
    }

    /// Start building a request; send it with [`RotatingClient::send`]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        self.execute(builder.build()?).await
    }

    /// Rewrite `request` onto the next endpoint and send it
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(&self, request: Request) -> Result<Response> {
        if is_upgrade_request(request.headers()) {
            debug!("Upgrade request, bypassing rotation");
            return Ok(self.http.execute(request).await?);
        }

        let request = self.route(request)?;
        Ok(self.http.execute(request).await?)
    }

    /// Point `request` at the next endpoint without sending it
    ///
    /// Method, headers and body are kept; the `Host` header is dropped so the
    /// client fills in the endpoint's host.
    pub fn route(&self, mut request: Request) -> Result<Request> {
        let endpoint = self
            .manager
            .try_next()
            .ok_or(RotatorError::NoEndpointsAvailable)?;
        let url = rewrite_url(&endpoint, request.url())?;
        debug!(region = %endpoint.region, "Routing through {}", url);

        *request.url_mut() = url;
        request.headers_mut().remove(HOST);
        Ok(request)
    }
}

/// Target `url`'s path and query at `endpoint`'s stage
pub fn rewrite_url(endpoint: &EndpointRecord, url: &Url) -> Result<Url> {
    let path = url.path().trim_start_matches('/');
    let mut rewritten = format!("https://{}/{}/{}", endpoint.host(), STAGE_NAME, path);
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    Ok(Url::parse(&rewritten)?)
}

/// Whether the request asks for a websocket upgrade
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}
