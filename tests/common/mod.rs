//! In-process stand-in for the color backend and a Shelly bulb
#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FakeBackend {
    bodies: Arc<Mutex<Vec<Value>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    reply: Arc<Mutex<(u16, String)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            bodies: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(Mutex::new((
                200,
                r#"{"success":true,"message":"Color set successfully"}"#.to_string(),
            ))),
        }
    }

    /// Status and raw body returned by every later request
    pub fn reply_with(&self, status: u16, body: &str) {
        *self.reply.lock().unwrap() = (status, body.to_string());
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.queries.lock().unwrap().clone()
    }

    /// Serve on an ephemeral localhost port
    pub async fn spawn(&self) -> SocketAddr {
        let app = Router::new()
            .route("/api/color", post(post_color))
            .route("/light/0", get(shelly_light))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn reply(&self) -> (StatusCode, String) {
        let (status, body) = self.reply.lock().unwrap().clone();
        (StatusCode::from_u16(status).unwrap(), body)
    }
}

async fn post_color(State(backend): State<FakeBackend>, Json(body): Json<Value>) -> (StatusCode, String) {
    backend.bodies.lock().unwrap().push(body);
    backend.reply()
}

async fn shelly_light(
    State(backend): State<FakeBackend>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    backend.queries.lock().unwrap().push(query);
    backend.reply()
}
