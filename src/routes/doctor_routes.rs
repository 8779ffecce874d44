// src/routes/doctor_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::AuthContext,
    models::{ApiOk, AppState, DoctorProfile, DoctorRow, Location},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_doctors))
        .route("/{doctor_id}", get(get_doctor))
        .route("/location/{doctor_id}", patch(update_location))
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationFields {
    pub building_info: Option<String>,
    pub street_name: Option<String>,
    pub city_name: Option<String>,
    pub state_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    #[serde(default)]
    pub location: Option<LocationFields>,
}

pub fn validate_location(req: &LocationRequest) -> Result<Location, ApiError> {
    let Some(loc) = req.location.as_ref() else {
        return Err(ApiError::validation("location is required"));
    };

    fn field(v: &Option<String>, name: &str) -> Result<String, ApiError> {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::validation(format!("{name} is required")))
    }

    Ok(Location {
        building_info: field(&loc.building_info, "building_info")?,
        street_name: field(&loc.street_name, "street_name")?,
        city_name: field(&loc.city_name, "city_name")?,
        state_name: field(&loc.state_name, "state_name")?,
    })
}

pub async fn list_doctors(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<DoctorProfile>>>, ApiError> {
    Ok(Json(ApiOk {
        data: state.store.list_doctors().await?,
    }))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<DoctorProfile>>, ApiError> {
    let doctor = state
        .store
        .doctor_profile(doctor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;
    Ok(Json(ApiOk { data: doctor }))
}

pub async fn update_location(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<ApiOk<DoctorRow>>, ApiError> {
    let location = validate_location(&req)?;

    if !auth.is_admin() {
        let own = auth.doctor(&state).await?;
        if own.doctor_id != doctor_id {
            return Err(ApiError::forbidden("You can only update your own location"));
        }
    }

    let doctor = state
        .store
        .update_doctor_location(doctor_id, location)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;

    tracing::info!(%doctor_id, "doctor location updated");
    Ok(Json(ApiOk { data: doctor }))
}
