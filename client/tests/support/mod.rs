//! Throwaway hyper backend speaking the same auth, notification and push
//! routes the client expects.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::{Value, json};
use shared::types::{ApiConfig, ClientConfig, LoginData};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

type Body = BoxBody<Bytes, Infallible>;

pub const REFRESH_COOKIE: &str = "refresh_id=r-alice";

struct State {
    valid_token: Mutex<String>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    notifications: Mutex<Vec<Value>>,
    pushes: broadcast::Sender<String>,
}

impl State {
    fn issue_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{}", n);
        *self.valid_token.lock().unwrap() = token.clone();
        token
    }

    fn is_valid(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| *self.valid_token.lock().unwrap() == t)
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    state: Arc<State>,
}

impl Backend {
    pub async fn start() -> Self {
        let (pushes, _) = broadcast::channel(32);
        let state = Arc::new(State {
            valid_token: Mutex::new(String::new()),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            notifications: Mutex::new(Vec::new()),
            pushes,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(
                            io,
                            service_fn(move |req| route(req, Arc::clone(&state))),
                        )
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(ApiConfig::with_base_url(format!("http://{}", self.addr)));
        config.api.logout_path = Some("/auth/logout".into());
        config
    }

    /// Invalidate every token handed out so far.
    pub fn expire_tokens(&self) {
        *self.state.valid_token.lock().unwrap() = "revoked".into();
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn add_notification(&self, id: i64, topic_id: i64, created_at: i64) {
        self.state.notifications.lock().unwrap().push(message(id, topic_id, created_at));
    }

    /// Push one frame to every open stream.
    pub fn push(&self, event: &str, data: &Value) {
        let _ = self.state.pushes.send(format_raw(event, data));
    }

    pub fn time_out_streams(&self) {
        self.push("timeout", &json!({}));
    }
}

pub fn message(id: i64, topic_id: i64, created_at: i64) -> Value {
    json!({
        "id": id,
        "topic_id": topic_id,
        "body": format!("update {}", id),
        "created_at": created_at,
    })
}

fn format_raw(event_type: &str, data: &Value) -> String {
    format!("event: {}\ndata: {}\n\n", event_type, data)
}

fn full(status: StatusCode, body: Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())).boxed())
        .unwrap()
}

fn error(status: StatusCode, code: &str, message: &str) -> Response<Body> {
    full(
        status,
        json!({"status": "error", "code": code, "message": message}),
    )
}

fn bearer(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

fn has_refresh_cookie(req: &Request<Incoming>) -> bool {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .any(|cookies| cookies.split(';').any(|c| c.trim() == REFRESH_COOKIE))
}

fn tokens(token: String) -> Value {
    json!({
        "access_token": token,
        "account": {"id": "u1", "username": "alice", "is_active": true},
    })
}

async fn route(req: Request<Incoming>, state: Arc<State>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let response = match (method, path.as_str()) {
        (Method::POST, "/auth/login") => login(req, &state).await,
        (Method::POST, "/auth/refresh") => refresh(&req, &state).await,
        (Method::POST, "/auth/logout") => full(StatusCode::OK, json!({"status": "ok"})),
        (Method::GET, "/users/me") if state.is_valid(bearer(&req)) => full(
            StatusCode::OK,
            json!({"id": "u1", "username": "alice", "is_active": true}),
        ),
        (Method::GET, "/notifications") if state.is_valid(bearer(&req)) => {
            let all = state.notifications.lock().unwrap().clone();
            full(StatusCode::OK, Value::Array(all))
        }
        (Method::GET, "/users/me" | "/notifications") => {
            error(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expired")
        }
        (Method::GET, p) if p.starts_with("/notifications/stream/") => stream(&req, &state, p),
        _ => error(StatusCode::NOT_FOUND, "NOT_FOUND", "No such route"),
    };
    Ok(response)
}

async fn login(req: Request<Incoming>, state: &State) -> Response<Body> {
    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();
    match serde_json::from_slice::<LoginData>(&body) {
        Ok(creds) if creds.username == "alice" && creds.password == "pw" => {
            let mut response = full(StatusCode::OK, tokens(state.issue_token()));
            response.headers_mut().insert(
                header::SET_COOKIE,
                header::HeaderValue::from_str(&format!("{}; Path=/; HttpOnly", REFRESH_COOKIE))
                    .unwrap(),
            );
            response
        }
        _ => error(
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "Invalid username or password",
        ),
    }
}

async fn refresh(req: &Request<Incoming>, state: &State) -> Response<Body> {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if !has_refresh_cookie(req) {
        return error(StatusCode::UNAUTHORIZED, "NO_SESSION", "Refresh cookie missing");
    }
    // Long enough for concurrent callers to pile up behind one refresh.
    tokio::time::sleep(Duration::from_millis(50)).await;
    full(StatusCode::OK, tokens(state.issue_token()))
}

fn stream(req: &Request<Incoming>, state: &State, path: &str) -> Response<Body> {
    let token = form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned());
    if !state.is_valid(token.as_deref()) {
        return error(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expired");
    }
    let Some(topic_id) = path
        .rsplit('/')
        .next()
        .and_then(|id| id.parse::<i64>().ok())
    else {
        return error(StatusCode::NOT_FOUND, "NOT_FOUND", "No such topic");
    };

    // Newest first, the way the backend happens to store them.
    let mut snapshot: Vec<Value> = state
        .notifications
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m["topic_id"] == topic_id)
        .cloned()
        .collect();
    snapshot.reverse();

    let mut rx = state.pushes.subscribe();
    let stream = async_stream::stream! {
        yield Ok::<Bytes, Infallible>(Bytes::from(format_raw("initial", &Value::Array(snapshot))));
        yield Ok::<Bytes, Infallible>(Bytes::from_static(b": keep-alive\n\n"));

        while let Ok(frame) = rx.recv().await {
            let last = frame.starts_with("event: timeout");
            yield Ok::<Bytes, Infallible>(Bytes::from(frame));
            if last {
                break;
            }
        }
    };

    let body = BodyExt::boxed(StreamBody::new(stream.map(|result| result.map(Frame::data))));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
}
