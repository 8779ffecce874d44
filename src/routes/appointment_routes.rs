// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use chrono::{Local, NaiveDate};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::AuthContext,
    models::{ApiOk, AppState, AppointmentDetails},
    services::{
        appointments::{self, BookingRequest, StatusUpdateRequest},
        listing::{self, CalendarMonth, CalendarQuery, NotificationPage, PageQuery},
    },
    tokens::QrPayload,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctor-scan", post(doctor_scan))
        .route("/all-appointments", get(all_appointments))
        .route("/notifications", get(notifications))
        .route("/calendar-appointments", get(calendar_appointments))
        .route("/status/{appointment_id}", patch(update_status))
        .route("/{doctor_id}", post(book))
}

/// Server-local calendar date; bookings and check-ins compare against it.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

/* ============================================================
   Workflow
   ============================================================ */

pub async fn book(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDetails>>), ApiError> {
    let patient = auth.patient(&state).await?;
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(ApiError::session_expired)?;

    let details =
        appointments::book_appointment(&state, &patient, &user.email, doctor_id, &req, today())
            .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: details })))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<ApiOk<AppointmentDetails>>, ApiError> {
    let doctor = auth.doctor(&state).await?;
    let event = appointments::parse_decision(&req.status)?;
    let details = appointments::update_status(&state, &doctor, appointment_id, event).await?;
    Ok(Json(ApiOk { data: details }))
}

pub async fn doctor_scan(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(scan): Json<QrPayload>,
) -> Result<Json<ApiOk<AppointmentDetails>>, ApiError> {
    let doctor = auth.doctor(&state).await?;
    let details = appointments::scan_qr(&state, &doctor, &scan, today()).await?;
    Ok(Json(ApiOk { data: details }))
}

/* ============================================================
   Listings
   ============================================================ */

pub async fn all_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDetails>>>, ApiError> {
    let party = listing::resolve_party(&state, &auth).await?;
    Ok(Json(ApiOk {
        data: listing::list_appointments(&state, party).await?,
    }))
}

pub async fn notifications(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<PageQuery>,
) -> Result<Json<ApiOk<NotificationPage>>, ApiError> {
    let party = listing::resolve_party(&state, &auth).await?;
    let page = listing::parse_page(q.page.as_deref());
    Ok(Json(ApiOk {
        data: listing::list_notifications(&state, party, page).await?,
    }))
}

pub async fn calendar_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<ApiOk<CalendarMonth>>, ApiError> {
    let (year, month) = listing::parse_year_month(&q)?;
    let doctor = auth.doctor(&state).await?;
    Ok(Json(ApiOk {
        data: listing::calendar(&state, doctor.doctor_id, year, month).await?,
    }))
}
