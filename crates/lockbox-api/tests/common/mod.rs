#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use lockbox_api::auth::{AppState, AppStateInner};
use lockbox_api::envelopes::ConversationPolicy;
use lockbox_crypto::KeyMaterialService;
use lockbox_db::Database;
use lockbox_gateway::dispatcher::Dispatcher;

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

impl TestApp {
    pub fn new(policy: ConversationPolicy) -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "integration-test-secret".into(),
            dispatcher: Dispatcher::with_push_timeout(Duration::from_millis(100)),
            crypto: KeyMaterialService::simulated(),
            conversation_policy: policy,
        });
        let router = lockbox_api::router(state.clone());
        Self { state, router }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request and return the status with the parsed JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, token, body).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn register(&self, username: &str) -> TestUser {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct horse battery" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        TestUser {
            id: body["identity_id"].as_str().unwrap().parse().unwrap(),
            username: username.to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
