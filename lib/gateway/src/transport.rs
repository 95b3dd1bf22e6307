//! HTTP transport for the gateway.
//!
//! A [`Transport`] performs exactly one HTTP exchange and never interprets the
//! status code; policy lives in the middleware pipeline above it.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde_json::Value;
use tracing::{debug, instrument};

/// An outbound request, relative to the gateway's base endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    /// Never attach a stored credential to this request.
    anonymous: bool,
    /// Set once this request has been re-dispatched after a token refresh.
    retried: bool,
}

impl ApiRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            anonymous: false,
            retried: false,
        }
    }

    /// Marks the request as anonymous: no stored credential is attached.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Returns true if no stored credential may be attached.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header, replacing any existing header with the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the path relative to the base endpoint.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the JSON body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns all headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the value of a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Returns the bearer credential carried in the `Authorization` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Attaches `token` as the bearer credential.
    pub fn set_bearer_token(&mut self, token: &str) {
        self.set_header(AUTHORIZATION.as_str(), format!("Bearer {token}"));
    }

    /// Returns true if this request has already been re-dispatched once.
    #[must_use]
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Marks this request as re-dispatched.
    pub fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// The raw outcome of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: StatusCode,
    body: Value,
}

impl ApiResponse {
    /// Creates a response. An empty body is represented as `Value::Null`.
    #[must_use]
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Consumes the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Returns the server-provided error message, if the body carries one.
    ///
    /// Looks at `detail` first, then `error`.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        ["detail", "error"]
            .iter()
            .find_map(|key| self.body.get(key).and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns an error only if no HTTP response was obtained.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Report<GatewayError>>;
}

/// [`Transport`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for the configured base endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &GatewayConfig) -> Result<Self, Report<GatewayError>> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidRequest {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method().clone(), self.url(request.path()));

        // Per-call headers append rather than replace.
        if request.header(CONTENT_TYPE.as_str()).is_none() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), path = request.path()))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Report<GatewayError>> {
        let response = self.prepare(request).send().await.map_err(|e| {
            if e.is_builder() {
                GatewayError::InvalidRequest {
                    details: e.to_string(),
                }
            } else {
                GatewayError::Network {
                    details: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| GatewayError::Network {
            details: format!("failed to read response body: {e}"),
        })?;

        debug!(%status, len = bytes.len(), "response received");

        Ok(ApiResponse::new(status, decode_body(&bytes)))
    }
}

/// Decodes a response body. Non-JSON bodies are kept as a JSON string.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
