use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_token;
use crate::error::ApiError;
use crate::models::{AppState, DoctorRow, PatientRow, Role};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub session_token_id: Uuid,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The caller's doctor profile; forbidden for any other role.
    pub async fn doctor(&self, state: &AppState) -> Result<DoctorRow, ApiError> {
        if self.role != Role::Doctor {
            return Err(ApiError::forbidden("Doctor access required"));
        }
        state
            .store
            .find_doctor_by_user(self.user_id)
            .await?
            .ok_or_else(|| ApiError::forbidden("Doctor profile not found"))
    }

    /// The caller's patient profile; forbidden for any other role.
    pub async fn patient(&self, state: &AppState) -> Result<PatientRow, ApiError> {
        if self.role != Role::Patient {
            return Err(ApiError::forbidden("Patient access required"));
        }
        state
            .store
            .find_patient_by_user(self.user_id)
            .await?
            .ok_or_else(|| ApiError::forbidden("Patient profile not found"))
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            // live, unrevoked session; the lookup also bumps last_seen_at
            let row = state
                .store
                .find_active_session(&hash_token(authz.token()))
                .await?
                .ok_or_else(ApiError::session_expired)?;

            Ok(AuthContext {
                user_id: row.user_id,
                role: row.role,
                session_token_id: row.session_token_id,
            })
        }
    }
}
