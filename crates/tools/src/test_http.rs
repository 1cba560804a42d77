//! One-shot HTTP responders for client tests.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// What the responder was sent.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct ResponderState {
    status: StatusCode,
    body: &'static str,
    recorded: Arc<Mutex<Option<oneshot::Sender<RecordedRequest>>>>,
}

/// Serve `body` with `status` and return the URL to hit.
pub async fn serve_once(status: u16, body: &'static str) -> String {
    serve_recording(status, body).await.0
}

/// Like [`serve_once`]; the receiver yields the first request.
pub async fn serve_recording(
    status: u16,
    body: &'static str,
) -> (String, oneshot::Receiver<RecordedRequest>) {
    let (tx, rx) = oneshot::channel();
    let state = ResponderState {
        status: StatusCode::from_u16(status).expect("valid status code"),
        body,
        recorded: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new().fallback(respond).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind responder");
    let url = format!("http://{}/", listener.local_addr().expect("responder address"));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (url, rx)
}

async fn respond(
    State(state): State<ResponderState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = RecordedRequest {
        method,
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    };
    if let Some(tx) = state.recorded.lock().ok().and_then(|mut slot| slot.take()) {
        let _ = tx.send(request);
    }

    (state.status, [(CONTENT_TYPE, "application/json")], state.body)
}
