//! Shared setup for membership-service integration tests.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use membership_service::{
    build_router,
    clock::ManualClock,
    config::{
        CredentialConfig, Environment, MembershipConfig, StoreBackend, StoreConfig, TokenConfig,
    },
    models::{User, UserId},
    services::{MembershipCore, MemoryStore, Stores, UserStore},
    utils::Password,
    AppState,
};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Tr0ub4dor&3";

pub fn test_config(backend: StoreBackend, operation_timeout_ms: u64) -> MembershipConfig {
    MembershipConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "membership-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        store: StoreConfig {
            backend,
            database_url: std::env::var("DATABASE_URL").ok().map(Secret::new),
            max_connections: 20,
            min_connections: 1,
            operation_timeout_ms,
        },
        tokens: TokenConfig {
            signing_key: Secret::new("integration-test-signing-key-0123456789".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            opaque_token_expiry_days: 30,
            purge_interval_seconds: 60,
        },
        credentials: CredentialConfig {
            server_salt: Secret::new("integration-test-server-salt-01234567".to_string()),
            min_entropy_bits: 60.0,
            max_password_bytes: 72,
            hash_concurrency: 4,
        },
    }
}

/// Core and router over an in-memory store and a manual clock.
pub struct TestApp {
    pub core: MembershipCore,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub router: Router,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_timeout(5_000)
    }

    pub fn with_timeout(operation_timeout_ms: u64) -> Self {
        let config = test_config(StoreBackend::Memory, operation_timeout_ms);
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let core = MembershipCore::new(
            &config,
            Stores::from_backend(store.clone()),
            Arc::new(clock.clone()),
        );
        let router = build_router(AppState {
            config,
            core: core.clone(),
        });

        Self {
            core,
            store,
            clock,
            router,
        }
    }

    /// Registers through the core (hashes the password).
    pub async fn register(&self, email: &str) -> UserId {
        self.core
            .register_user(email, &Password::new(PASSWORD.to_string()))
            .await
            .expect("registration failed")
            .user_id
    }

    /// Inserts a user directly, skipping the password hash.
    pub async fn seed_user(&self) -> UserId {
        let user = User::new(
            &format!("{}@example.com", uuid::Uuid::new_v4()),
            "$argon2id$unused".to_string(),
        );
        UserStore::create(&self.store, &user)
            .await
            .expect("seeding user failed");
        user.user_id
    }

    pub async fn signed_token(&self, email: &str) -> String {
        self.core
            .issue_token(email, &Password::new(PASSWORD.to_string()), "signed")
            .await
            .expect("token issuance failed")
            .token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
