//! Scripted transport for exercising the gateway without a network.

use crate::error::GatewayError;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

enum Outcome {
    Respond(ApiResponse),
    Fail(String),
}

struct Route {
    method: Method,
    path: String,
    outcomes: VecDeque<Outcome>,
}

struct Gate {
    method: Method,
    path: String,
    release: Arc<Notify>,
}

/// A [`Transport`] that answers from per-route queues and records every request.
///
/// Each `(method, path)` route answers with its queued outcomes in order; a
/// route whose queue is exhausted, or an unscripted route, answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    gates: Mutex<Vec<Gate>>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, outcome: Outcome) {
        let mut routes = self.routes.lock().expect("routes lock");
        match routes
            .iter_mut()
            .find(|route| route.method == method && route.path == path)
        {
            Some(route) => route.outcomes.push_back(outcome),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                outcomes: VecDeque::from([outcome]),
            }),
        }
    }

    /// Queues a response for `method path`.
    pub fn respond(&self, method: Method, path: &str, status: StatusCode, body: Value) -> &Self {
        self.push(method, path, Outcome::Respond(ApiResponse::new(status, body)));
        self
    }

    /// Queues a network failure for `method path`.
    pub fn fail(&self, method: Method, path: &str, details: &str) -> &Self {
        self.push(method, path, Outcome::Fail(details.to_string()));
        self
    }

    /// Holds the next request to `method path` until the returned handle is
    /// notified. The request is recorded before it waits.
    pub fn gate(&self, method: Method, path: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.gates.lock().expect("gates lock").push(Gate {
            method,
            path: path.to_string(),
            release: release.clone(),
        });
        release
    }

    /// Returns every request sent so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Returns the requests sent to `path`, in order.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path() == path)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Report<GatewayError>> {
        self.sent.lock().expect("sent lock").push(request.clone());

        let gate = {
            let mut gates = self.gates.lock().expect("gates lock");
            gates
                .iter()
                .position(|gate| gate.method == *request.method() && gate.path == request.path())
                .map(|index| gates.remove(index))
        };
        if let Some(gate) = gate {
            gate.release.notified().await;
        }

        let outcome = {
            let mut routes = self.routes.lock().expect("routes lock");
            routes
                .iter_mut()
                .find(|route| route.method == *request.method() && route.path == request.path())
                .and_then(|route| route.outcomes.pop_front())
        };

        match outcome {
            Some(Outcome::Respond(response)) => Ok(response),
            Some(Outcome::Fail(details)) => Err(GatewayError::Network { details }.into()),
            None => Ok(ApiResponse::new(
                StatusCode::NOT_FOUND,
                json!({ "detail": format!("no scripted response for {} {}", request.method(), request.path()) }),
            )),
        }
    }
}
