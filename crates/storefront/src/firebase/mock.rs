//! In-process Firestore REST stand-in for tests.
//!
//! Every request is recorded and answered with the next scripted response.
//! Unscripted requests get a 500.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::config::{StorefrontConfig, test_config};

/// A request as the mock server saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    /// All decoded values of one query parameter.
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<(StatusCode, Value)>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<Script>>;

pub(crate) struct MockFirestore {
    addr: SocketAddr,
    script: Shared,
}

impl MockFirestore {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        let script = Shared::default();
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&script));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, script }
    }

    /// Storefront config whose Firestore client talks to this server.
    pub fn config(&self) -> StorefrontConfig {
        let mut config = test_config();
        config.firebase.firestore_emulator_host = Some(self.addr.to_string());
        config
    }

    /// Queue the response for the next request.
    pub fn respond(&self, status: StatusCode, body: Value) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back((status, body));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

async fn handle(
    State(script): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let mut script = script.lock().unwrap();
    script.requests.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query,
        authorization,
        body,
    });
    let (status, body) = script
        .responses
        .pop_front()
        .unwrap_or_else(|| (StatusCode::INTERNAL_SERVER_ERROR, error(500, "INTERNAL")));
    (status, Json(body)).into_response()
}

/// A document resource as Firestore returns it.
pub(crate) fn document(path: &str, update_time: &str, fields: Value) -> Value {
    json!({
        "name": format!("projects/yss-test/databases/(default)/documents/{path}"),
        "fields": fields,
        "createTime": "2026-10-01T00:00:00.000000Z",
        "updateTime": update_time,
    })
}

/// A Google API error envelope.
pub(crate) fn error(code: u16, status: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": format!("mock {status}"),
            "status": status,
        }
    })
}
