//! The API gateway client.
//!
//! Every backend call goes through a single [`GatewayClient`], which runs the
//! request pipeline and turns raw responses into payloads or errors. Callers
//! never handle access tokens themselves.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{self, SessionEvent};
use crate::middleware::{BearerAuth, Middleware, Next, RefreshOnUnauthorized};
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use stockroom_core::SessionVault;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// Per-call request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    anonymous: bool,
}

impl RequestOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header override. A caller-supplied `Authorization` header
    /// takes precedence over the stored access token.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sends the request without any stored credential.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn Middleware>>,
    vault: SessionVault,
    events: broadcast::Sender<SessionEvent>,
}

/// Single point of outbound HTTP communication with the backend.
///
/// Cloning is cheap; clones share the pipeline, vault and event channel.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("middleware", &self.inner.middleware.len())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Creates a client that talks HTTP to the configured base endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &GatewayConfig, vault: SessionVault) -> Result<Self, Report<GatewayError>> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), vault))
    }

    /// Creates a client over an arbitrary transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, vault: SessionVault) -> Self {
        let events = events::channel();
        let middleware: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(BearerAuth::new(vault.clone())),
            Arc::new(RefreshOnUnauthorized::new(
                vault.clone(),
                transport.clone(),
                events.clone(),
            )),
        ];

        Self {
            inner: Arc::new(Inner {
                transport,
                middleware,
                vault,
                events,
            }),
        }
    }

    /// Returns the vault holding the durable session.
    #[must_use]
    pub fn vault(&self) -> &SessionVault {
        &self.inner.vault
    }

    /// Subscribes to session lifecycle events raised beneath the session store.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Sends a request through the pipeline and returns the response payload.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Status`] for any non-success status other than an
    ///   exhausted authorization failure, unmodified
    /// - [`GatewayError::Unauthorized`] if the request was still rejected
    ///   after a refresh, or carried no credential
    /// - [`GatewayError::RefreshFailed`] if the refresh itself failed
    /// - [`GatewayError::Network`] if no response was obtained
    #[instrument(skip(self, body, options), fields(%method, path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, Report<GatewayError>> {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        for (name, value) in options.headers {
            request.set_header(name, value);
        }
        if options.anonymous {
            request = request.anonymous();
        }

        let response = Next::new(&*self.inner.transport, &self.inner.middleware)
            .run(request)
            .await?;
        debug!(status = %response.status(), "request completed");

        into_payload(response)
    }

    /// Sends a GET and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::request`]; additionally [`GatewayError::Decode`]
    /// if the payload does not match `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Report<GatewayError>> {
        let payload = self
            .request(Method::GET, path, None, RequestOptions::default())
            .await?;
        decode(payload)
    }

    /// Sends a POST with a JSON body and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::get`].
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Report<GatewayError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post_with(path, body, RequestOptions::default()).await
    }

    /// Sends a POST with per-call options and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::get`].
    pub async fn post_with<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, Report<GatewayError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode(body)?;
        let payload = self.request(Method::POST, path, Some(body), options).await?;
        decode(payload)
    }

    /// Sends a PUT with a JSON body and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::get`].
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, Report<GatewayError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode(body)?;
        let payload = self
            .request(Method::PUT, path, Some(body), RequestOptions::default())
            .await?;
        decode(payload)
    }

    /// Sends a DELETE, returning the raw payload.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::request`].
    pub async fn delete(&self, path: &str) -> Result<Value, Report<GatewayError>> {
        self.request(Method::DELETE, path, None, RequestOptions::default())
            .await
    }
}

fn into_payload(response: ApiResponse) -> Result<Value, Report<GatewayError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.into_body());
    }

    let detail = response.detail();
    if status == StatusCode::UNAUTHORIZED {
        return Err(GatewayError::Unauthorized { detail }.into());
    }
    Err(GatewayError::Status { status, detail }.into())
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, Report<GatewayError>> {
    serde_json::to_value(body).map_err(|e| {
        GatewayError::InvalidRequest {
            details: format!("failed to encode request body: {e}"),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, Report<GatewayError>> {
    serde_json::from_value(payload).map_err(|e| {
        GatewayError::Decode {
            details: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TerminationReason;
    use crate::middleware::REFRESH_PATH;
    use crate::testing::ScriptedTransport;
    use serde::Deserialize;
    use serde_json::json;
    use stockroom_core::{KeyValueStore, MemoryStore};

    const PRODUCTS: &str = "/productos/";

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        client: GatewayClient,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let store = Arc::new(MemoryStore::new());
        let vault = SessionVault::new(store.clone());
        let client = GatewayClient::with_transport(transport.clone(), vault);
        Fixture {
            transport,
            store,
            client,
        }
    }

    fn signed_in(fixture: &Fixture) {
        fixture
            .client
            .vault()
            .store_session("T1", "R1", r#"{"email":"a@b.com","rol":"EXTERNO"}"#)
            .expect("store session");
    }

    fn unauthorized() -> Value {
        json!({ "detail": "Given token not valid for any token type" })
    }

    fn error_of(report: &Report<GatewayError>) -> &GatewayError {
        report.current_context()
    }

    #[tokio::test]
    async fn attaches_stored_token_as_bearer() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::OK, json!([]));

        let payload = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .expect("request");

        assert_eq!(payload, json!([]));
        let sent = f.transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header("Authorization"), Some("Bearer T1"));
    }

    #[tokio::test]
    async fn unauthenticated_request_passes_through_unchanged() {
        let f = fixture();
        f.transport
            .respond(Method::GET, "/empresas/", StatusCode::OK, json!([]));

        f.client
            .request(Method::GET, "/empresas/", None, RequestOptions::default())
            .await
            .expect("request");

        assert_eq!(f.transport.requests()[0].header("Authorization"), None);
    }

    #[tokio::test]
    async fn anonymous_option_suppresses_stored_token() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::POST, "/auth/login/", StatusCode::OK, json!({}));

        f.client
            .request(
                Method::POST,
                "/auth/login/",
                Some(json!({})),
                RequestOptions::new().anonymous(),
            )
            .await
            .expect("request");

        assert_eq!(f.transport.requests()[0].header("Authorization"), None);
    }

    #[tokio::test]
    async fn header_override_wins_over_stored_token() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::OK, Value::Null);

        f.client
            .request(
                Method::GET,
                PRODUCTS,
                None,
                RequestOptions::new()
                    .header("Authorization", "Bearer override")
                    .header("Accept-Language", "es"),
            )
            .await
            .expect("request");

        let sent = &f.transport.requests()[0];
        assert_eq!(sent.bearer_token(), Some("override"));
        assert_eq!(sent.header("accept-language"), Some("es"));
    }

    #[tokio::test]
    async fn refreshes_once_and_returns_retried_payload() {
        let f = fixture();
        signed_in(&f);
        let mut events = f.client.subscribe();
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::GET, PRODUCTS, StatusCode::OK, json!([{"codigo": "ABC001"}]))
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T2"}));

        let payload = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .expect("retried request succeeds");

        assert_eq!(payload, json!([{"codigo": "ABC001"}]));
        assert_eq!(f.store.get("access_token").expect("get").as_deref(), Some("T2"));
        assert_eq!(f.store.get("refresh_token").expect("get").as_deref(), Some("R1"));

        let refreshes = f.transport.requests_to(REFRESH_PATH);
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].body(), Some(&json!({"refresh": "R1"})));
        assert_eq!(refreshes[0].header("Authorization"), None);

        let attempts = f.transport.requests_to(PRODUCTS);
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].bearer_token(), Some("T1"));
        assert!(!attempts[0].is_retried());
        assert_eq!(attempts[1].bearer_token(), Some("T2"));
        assert!(attempts[1].is_retried());

        assert_eq!(events.try_recv().expect("event"), SessionEvent::TokenRefreshed);
    }

    #[tokio::test]
    async fn refresh_happens_strictly_before_retry() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::DELETE, "/productos/7/", StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::DELETE, "/productos/7/", StatusCode::NO_CONTENT, Value::Null)
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T2"}));

        f.client.delete("/productos/7/").await.expect("delete");

        let order: Vec<String> = f
            .transport
            .requests()
            .iter()
            .map(|r| format!("{} {}", r.method(), r.path()))
            .collect();
        assert_eq!(
            order,
            vec![
                "DELETE /productos/7/",
                "POST /auth/token/refresh/",
                "DELETE /productos/7/",
            ]
        );
    }

    #[tokio::test]
    async fn refresh_failure_clears_session_and_surfaces_refresh_error() {
        let f = fixture();
        signed_in(&f);
        let mut events = f.client.subscribe();
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(
                Method::POST,
                REFRESH_PATH,
                StatusCode::UNAUTHORIZED,
                json!({"detail": "Token is blacklisted"}),
            );

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error_of(&report), GatewayError::RefreshFailed { .. }));
        assert!(f.store.is_empty());
        assert_eq!(f.transport.requests_to(PRODUCTS).len(), 1);
        assert_eq!(
            events.try_recv().expect("event"),
            SessionEvent::Terminated {
                reason: TerminationReason::RefreshFailed
            }
        );
    }

    #[tokio::test]
    async fn refresh_network_failure_is_unrecoverable() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .fail(Method::POST, REFRESH_PATH, "connection reset");

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error_of(&report), GatewayError::RefreshFailed { .. }));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_refresh_call() {
        let f = fixture();
        f.client.vault().store_access_token("T1").expect("store");
        let mut events = f.client.subscribe();
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized());

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error_of(&report), GatewayError::RefreshFailed { .. }));
        assert!(f.transport.requests_to(REFRESH_PATH).is_empty());
        assert!(f.store.is_empty());
        assert_eq!(
            events.try_recv().expect("event"),
            SessionEvent::Terminated {
                reason: TerminationReason::MissingRefreshToken
            }
        );
    }

    #[tokio::test]
    async fn second_rejection_does_not_refresh_again() {
        let f = fixture();
        signed_in(&f);
        let mut events = f.client.subscribe();
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::GET, PRODUCTS, StatusCode::OK, json!([]))
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T2"}))
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T3"}));

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error_of(&report), GatewayError::Unauthorized { .. }));
        assert_eq!(f.transport.requests_to(REFRESH_PATH).len(), 1);
        assert_eq!(f.transport.requests_to(PRODUCTS).len(), 2);
        assert!(f.store.is_empty());

        assert_eq!(events.try_recv().expect("event"), SessionEvent::TokenRefreshed);
        assert_eq!(
            events.try_recv().expect("event"),
            SessionEvent::Terminated {
                reason: TerminationReason::RetryRejected
            }
        );
    }

    #[tokio::test]
    async fn retried_non_auth_failure_is_returned_without_terminating() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(
                Method::GET,
                PRODUCTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Error interno"}),
            )
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T2"}));

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            error_of(&report),
            &GatewayError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: Some("Error interno".to_string()),
            }
        );
        assert_eq!(f.store.get("access_token").expect("get").as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn non_auth_errors_are_never_retried() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(
                Method::POST,
                "/movimientos/",
                StatusCode::BAD_REQUEST,
                json!({"error": "Stock insuficiente"}),
            )
            .fail(Method::GET, PRODUCTS, "connection refused");

        let report = f
            .client
            .request(Method::POST, "/movimientos/", Some(json!({})), RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error_of(&report).status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(error_of(&report).detail(), Some("Stock insuficiente"));

        let report = f
            .client
            .request(Method::GET, PRODUCTS, None, RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error_of(&report), GatewayError::Network { .. }));

        assert!(f.transport.requests_to(REFRESH_PATH).is_empty());
        assert_eq!(f.store.len(), 3);
    }

    #[tokio::test]
    async fn unauthorized_without_credential_is_not_refreshed() {
        let f = fixture();
        f.transport.respond(
            Method::POST,
            "/auth/login/",
            StatusCode::UNAUTHORIZED,
            json!({"error": "Credenciales inválidas"}),
        );

        let report = f
            .client
            .request(
                Method::POST,
                "/auth/login/",
                Some(json!({"email": "a@b.com", "password": "wrong"})),
                RequestOptions::new().anonymous(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            error_of(&report),
            &GatewayError::Unauthorized {
                detail: Some("Credenciales inválidas".to_string())
            }
        );
        assert!(f.transport.requests_to(REFRESH_PATH).is_empty());
    }

    #[tokio::test]
    async fn concurrent_rejections_refresh_independently() {
        let f = fixture();
        signed_in(&f);
        f.transport
            .respond(Method::GET, PRODUCTS, StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::GET, "/empresas/", StatusCode::UNAUTHORIZED, unauthorized())
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T2"}))
            .respond(Method::POST, REFRESH_PATH, StatusCode::OK, json!({"access": "T3"}))
            .respond(Method::GET, PRODUCTS, StatusCode::OK, json!([]))
            .respond(Method::GET, "/empresas/", StatusCode::OK, json!([]));

        let (products, companies) = tokio::join!(
            f.client.get::<Vec<Value>>(PRODUCTS),
            f.client.get::<Vec<Value>>("/empresas/"),
        );

        assert!(products.is_ok());
        assert!(companies.is_ok());
        assert_eq!(f.transport.requests_to(REFRESH_PATH).len(), 2);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Company {
        id: u32,
        nombre: String,
    }

    #[tokio::test]
    async fn typed_helpers_decode_payloads() {
        let f = fixture();
        f.transport
            .respond(
                Method::GET,
                "/empresas/1/",
                StatusCode::OK,
                json!({"id": 1, "nombre": "Acme"}),
            )
            .respond(
                Method::PUT,
                "/empresas/1/",
                StatusCode::OK,
                json!({"id": 1, "nombre": "Acme SA"}),
            )
            .respond(Method::GET, "/empresas/2/", StatusCode::OK, json!({"id": "x"}));

        let company: Company = f.client.get("/empresas/1/").await.expect("get");
        assert_eq!(
            company,
            Company {
                id: 1,
                nombre: "Acme".to_string()
            }
        );

        let updated: Company = f
            .client
            .put("/empresas/1/", &json!({"nombre": "Acme SA"}))
            .await
            .expect("put");
        assert_eq!(updated.nombre, "Acme SA");
        assert_eq!(
            f.transport.requests()[1].body(),
            Some(&json!({"nombre": "Acme SA"}))
        );

        let report = f.client.get::<Company>("/empresas/2/").await.unwrap_err();
        assert!(matches!(error_of(&report), GatewayError::Decode { .. }));
    }
}
