#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use bucket_access::access::{AccessResolver, AttachmentPolicy, CachedScope};
use bucket_access::handlers::{self, AppState, ListingLimits};
use bucket_access::middleware::{AuthKeys, Claims};
use bucket_access::testing::InMemoryStore;

pub const SECRET: &str = "integration-test-secret";
pub const ATTACHMENT_PREFIX: &str = "gs://uploads-correction-bucket/";

/// Router wired to a fresh in-memory store
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let resolver = AccessResolver::new(
            store.clone(),
            store.clone(),
            AttachmentPolicy::new(Some(ATTACHMENT_PREFIX.to_string())),
        );

        let state = AppState {
            resolver: Arc::new(resolver),
            catalog: store.clone(),
            auth: AuthKeys::from_secret(SECRET),
            limits: ListingLimits {
                max_course_ids: 20,
                max_items_per_page: 100,
            },
        };

        Self {
            store,
            router: handlers::app(state),
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, token, Some(serde_json::to_vec(&body)?)).await
    }

    /// POST a body verbatim, for payloads that are not valid JSON
    pub async fn post_raw(&self, uri: &str, token: Option<&str>, body: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, token, Some(body.as_bytes().to_vec())).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(bytes) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, json))
    }
}

/// Bearer token for `user_id` carrying `scope` in its app_metadata
pub fn token_for(user_id: Uuid, scope: &CachedScope) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
        app_metadata: serde_json::to_value(scope).expect("scope serializes"),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).expect("token encodes")
}
