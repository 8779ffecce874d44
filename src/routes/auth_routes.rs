// src/routes/auth_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{IssuedTokens, generate_token, hash_password, hash_token, verify_password},
    error::ApiError,
    middleware::AuthContext,
    models::*,
    store::{NewProfile, NewSession, NewUser, StoreError},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout).get(logout))
        .route("/me", get(me))
        .route("/role", get(role))
}

/* ============================================================
   Request / response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub phone_number: String,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub role: Option<Role>,

    // doctor profile
    pub specialization: Option<String>,
    pub experience: Option<i32>,
    pub fees: Option<i32>,

    // patient profile
    #[serde(default)]
    pub medical_history: Vec<MedicalHistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionTokens {
    pub token_type: &'static str,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub user: UserRow,
    pub session: SessionTokens,
}

#[derive(Debug, Serialize)]
pub struct MeData {
    pub user: UserRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor: Option<DoctorRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientRow>,
}

#[derive(Debug, Serialize)]
pub struct RoleData {
    pub role: &'static str,
}

/* ============================================================
   Validation
   ============================================================ */

fn required(value: &str, name: &str) -> Result<String, ApiError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::validation(format!("{name} is required")));
    }
    Ok(v.to_string())
}

pub fn validate_signup(req: &SignupRequest) -> Result<(NewUser, NewProfile), ApiError> {
    let first_name = required(&req.first_name, "first_name")?;
    let last_name = required(&req.last_name, "last_name")?;
    let email = required(&req.email, "email")?.to_lowercase();
    let phone_number = required(&req.phone_number, "phone_number")?;
    if req.password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("email is invalid"));
    }
    if req.age.is_some_and(|a| !(0..=150).contains(&a)) {
        return Err(ApiError::validation("age is out of range"));
    }

    let role = req.role.unwrap_or(Role::Patient);
    let profile = match role {
        Role::Admin => {
            return Err(ApiError::forbidden("Admin accounts cannot be created via signup"));
        }
        Role::Doctor => {
            if req.fees.is_some_and(|f| f < 0) || req.experience.is_some_and(|e| e < 0) {
                return Err(ApiError::validation("fees and experience cannot be negative"));
            }
            NewProfile::Doctor {
                specialization: req
                    .specialization
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                experience: req.experience,
                fees: req.fees,
            }
        }
        Role::Patient => NewProfile::Patient {
            medical_history: req.medical_history.clone(),
        },
    };

    let user = NewUser {
        first_name,
        last_name,
        email,
        // filled in by the caller once hashed
        password_hash: String::new(),
        phone_number,
        age: req.age,
        gender: req.gender,
        role,
    };
    Ok((user, profile))
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiOk<UserRow>>), ApiError> {
    let (mut user, profile) = validate_signup(&req)?;

    if state.store.find_user_by_email(&user.email).await?.is_some() {
        return Err(ApiError::validation("User already exists"));
    }

    user.password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let created = state
        .store
        .create_user(user, profile)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::validation("User already exists"),
            other => other.into(),
        })?;

    tracing::info!(user_id = %created.user_id, role = created.role.as_str(), "user signed up");
    Ok((StatusCode::CREATED, Json(ApiOk { data: created })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginData>>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let user = state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let tokens = IssuedTokens::generate();
    let now = Utc::now();
    let access_expires_at = now + Duration::minutes(state.access_ttl_minutes);
    let refresh_expires_at = now + Duration::days(state.refresh_ttl_days);

    let session = state
        .store
        .create_session(NewSession {
            user_id: user.user_id,
            access_token_hash: hash_token(&tokens.access_token),
            refresh_token_hash: hash_token(&tokens.refresh_token),
            access_expires_at,
            refresh_expires_at,
        })
        .await?;

    tracing::info!(user_id = %user.user_id, session_token_id = %session.session_token_id, "login");

    Ok(Json(ApiOk {
        data: LoginData {
            user,
            session: SessionTokens {
                token_type: "Bearer",
                access_token: tokens.access_token,
                access_expires_at: session.access_expires_at,
                refresh_token: Some(tokens.refresh_token),
                refresh_expires_at: session.refresh_expires_at,
            },
        },
    }))
}

/// Issue a new access token for a live session. The previous access token
/// stops working immediately.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiOk<SessionTokens>>, ApiError> {
    let access_token = generate_token();
    let access_expires_at = Utc::now() + Duration::minutes(state.access_ttl_minutes);

    let session = state
        .store
        .rotate_access_token(
            &hash_token(req.refresh_token.trim()),
            &hash_token(&access_token),
            access_expires_at,
        )
        .await?
        .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk {
        data: SessionTokens {
            token_type: "Bearer",
            access_token,
            access_expires_at: session.access_expires_at,
            refresh_token: None,
            refresh_expires_at: session.refresh_expires_at,
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let revoked = state.store.revoke_session(auth.session_token_id).await?;
    if !revoked {
        return Err(ApiError::session_expired());
    }
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeData>>, ApiError> {
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(ApiError::session_expired)?;

    let (doctor, patient) = match user.role {
        Role::Doctor => (state.store.find_doctor_by_user(user.user_id).await?, None),
        Role::Patient => (None, state.store.find_patient_by_user(user.user_id).await?),
        Role::Admin => (None, None),
    };

    Ok(Json(ApiOk {
        data: MeData {
            user,
            doctor,
            patient,
        },
    }))
}

pub async fn role(auth: AuthContext) -> Json<ApiOk<RoleData>> {
    Json(ApiOk {
        data: RoleData {
            role: auth.role.as_str(),
        },
    })
}
