// Shared fixtures for workflow and route tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::{IssuedTokens, hash_token};
use crate::mailer::testing::RecordingMailer;
use crate::models::{AppState, DoctorRow, PatientRow, Role, UserRow};
use crate::store::memory::MemoryStore;
use crate::store::{NewProfile, NewSession, NewUser, Store};

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::new())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let state = AppState {
            store: store.clone(),
            mailer: mailer.clone(),
            access_ttl_minutes: 50,
            refresh_ttl_days: 7,
            frontend_url: "http://localhost:5173".into(),
        };
        Self {
            state,
            store,
            mailer,
        }
    }

    fn new_user(first: &str, last: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            first_name: first.into(),
            last_name: last.into(),
            email: email.into(),
            password_hash: "unused".into(),
            phone_number: "555-0100".into(),
            age: Some(40),
            gender: None,
            role,
        }
    }

    pub async fn doctor(&self, first: &str, last: &str, email: &str) -> (UserRow, DoctorRow) {
        let user = self
            .store
            .create_user(
                Self::new_user(first, last, email, Role::Doctor),
                NewProfile::Doctor {
                    specialization: Some("Cardiology".into()),
                    experience: Some(10),
                    fees: Some(500),
                },
            )
            .await
            .unwrap();
        let doctor = self
            .store
            .find_doctor_by_user(user.user_id)
            .await
            .unwrap()
            .unwrap();
        (user, doctor)
    }

    pub async fn patient(&self, first: &str, last: &str, email: &str) -> (UserRow, PatientRow) {
        let user = self
            .store
            .create_user(
                Self::new_user(first, last, email, Role::Patient),
                NewProfile::Patient {
                    medical_history: vec![],
                },
            )
            .await
            .unwrap();
        let patient = self
            .store
            .find_patient_by_user(user.user_id)
            .await
            .unwrap()
            .unwrap();
        (user, patient)
    }

    /// Opens a session for the user and returns the bearer access token.
    pub async fn login(&self, user_id: Uuid) -> String {
        let tokens = IssuedTokens::generate();
        self.store
            .create_session(NewSession {
                user_id,
                access_token_hash: hash_token(&tokens.access_token),
                refresh_token_hash: hash_token(&tokens.refresh_token),
                access_expires_at: Utc::now() + Duration::minutes(50),
                refresh_expires_at: Utc::now() + Duration::days(7),
            })
            .await
            .unwrap();
        tokens.access_token
    }
}

/// Drives one request through the router and decodes the JSON reply.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
