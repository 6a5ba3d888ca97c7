//! Scripted HTTP stub server for integration tests.
//!
//! [`StubServer`] binds an axum router on a loopback port, records every
//! request it receives and answers from a script of [`Reply`] values. Once
//! the script is exhausted every request gets the fallback reply.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;

/// How the stub answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Status code with a small JSON body echoing it.
    Status(u16),
    /// Status code with an explicit JSON body.
    Body(u16, String),
    /// Accept the request and never answer.
    Hang,
}

impl Reply {
    pub fn body(status: u16, body: impl Into<String>) -> Self {
        Self::Body(status, body.into())
    }
}

/// One request as seen by the stub.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct StubState {
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

/// Handle to a running stub. The server lives until the test runtime stops.
pub struct StubServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    /// Serve `script` in order, then `200` for every later request.
    pub async fn scripted(script: Vec<Reply>) -> Self {
        Self::spawn(script, Reply::Status(200)).await
    }

    /// Answer every request with `reply`.
    pub async fn always(reply: Reply) -> Self {
        Self::spawn(Vec::new(), reply).await
    }

    async fn spawn(script: Vec<Reply>, fallback: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(answer).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    /// Absolute URL for `path` on this stub.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn answer(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());

    match reply {
        Reply::Hang => std::future::pending::<Response>().await,
        Reply::Status(code) => respond(code, format!("{{\"status\":{code}}}")),
        Reply::Body(code, body) => respond(code, body),
    }
}

fn respond(code: u16, body: String) -> Response {
    let status = StatusCode::from_u16(code).unwrap();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
