// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::patch,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::AuthContext,
    models::{ApiOk, AppState, Gender, MedicalHistoryEntry, PatientProfile},
    store::{PatientUpdate, StoreError},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/update/{patient_id}", patch(update_patient))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub medical_history: Option<Vec<MedicalHistoryEntry>>,
}

/// Present fields must be non-blank; absent fields are left untouched.
pub fn validate_patient_update(req: &UpdatePatientRequest) -> Result<PatientUpdate, ApiError> {
    fn text(v: &Option<String>, name: &str) -> Result<Option<String>, ApiError> {
        match v.as_deref().map(str::trim) {
            None => Ok(None),
            Some("") => Err(ApiError::validation(format!("{name} cannot be empty"))),
            Some(s) => Ok(Some(s.to_string())),
        }
    }

    let email = text(&req.email, "email")?.map(|e| e.to_lowercase());
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::validation("email is invalid"));
    }
    if req.age.is_some_and(|a| !(0..=150).contains(&a)) {
        return Err(ApiError::validation("age is out of range"));
    }

    Ok(PatientUpdate {
        first_name: text(&req.first_name, "first_name")?,
        last_name: text(&req.last_name, "last_name")?,
        age: req.age,
        gender: req.gender,
        phone_number: text(&req.phone_number, "phone_number")?,
        email,
        medical_history: req.medical_history.clone(),
    })
}

pub async fn update_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientProfile>>, ApiError> {
    if !auth.is_admin() {
        let own = auth.patient(&state).await?;
        if own.patient_id != patient_id {
            return Err(ApiError::forbidden("You can only update your own profile"));
        }
    }

    let update = validate_patient_update(&req)?;
    let profile = state
        .store
        .update_patient(patient_id, update)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::validation("Email already in use"),
            other => other.into(),
        })?
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;

    tracing::info!(%patient_id, "patient profile updated");
    Ok(Json(ApiOk { data: profile }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::test_support::{Harness, call};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn test_blank_fields_are_rejected() {
        let req = UpdatePatientRequest {
            last_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(validate_patient_update(&req).is_err());

        let req = UpdatePatientRequest {
            email: Some(" New@Example.com ".into()),
            ..Default::default()
        };
        let update = validate_patient_update(&req).unwrap();
        assert_eq!(update.email.as_deref(), Some("new@example.com"));
        assert!(update.first_name.is_none());
    }

    #[tokio::test]
    async fn test_patient_updates_own_profile_only() {
        let h = Harness::new();
        let app = routes::router(h.state.clone());
        let (cuddy_user, cuddy) = h.patient("Lisa", "Cuddy", "cuddy@example.com").await;
        let (_, other) = h.patient("Allison", "Cameron", "cameron@example.com").await;
        let token = h.login(cuddy_user.user_id).await;

        let body = json!({
            "age": 46,
            "medical_history": [{"disease": "migraine", "date": "2024-01-10", "notes": "mild"}]
        });
        let (status, json) = call(
            &app,
            Method::PATCH,
            &format!("/api/patient/update/{}", cuddy.patient_id),
            Some(&token),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["user"]["age"], 46);
        assert_eq!(json["data"]["user"]["first_name"], "Lisa");
        assert_eq!(
            json["data"]["profile"]["medical_history"][0]["disease"],
            "migraine"
        );

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/api/patient/update/{}", other.patient_id),
            Some(&token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = call(
            &app,
            Method::PATCH,
            &format!("/api/patient/update/{}", cuddy.patient_id),
            Some(&token),
            Some(json!({"email": "cameron@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "Email already in use");
    }
}
