// src/services/appointments.rs
//
// Booking, doctor decisions and QR check-in.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AppState, AppointmentDetails, AppointmentStatus, DoctorRow, PatientRow, Recipient,
};
use crate::services::lifecycle::{self, AppointmentEvent};
use crate::services::notifier;
use crate::store::{NewAppointment, NewReview, StatusChange, StoreError};
use crate::tokens::{QrPayload, generate_review_token, verification_token};

pub const MAX_NOTES_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub appointment_date: String,
    pub appointment_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidBooking {
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

/// Strict 24-hour `HH:MM` with a two-digit hour.
pub fn is_valid_time(s: &str) -> bool {
    s.len() == 5 && NaiveTime::parse_from_str(s, "%H:%M").is_ok()
}

pub fn validate_booking(req: &BookingRequest, today: NaiveDate) -> Result<ValidBooking, ApiError> {
    let date = NaiveDate::parse_from_str(req.appointment_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("appointment_date must be YYYY-MM-DD"))?;

    let time = req.appointment_time.trim();
    if !is_valid_time(time) {
        return Err(ApiError::validation(
            "Invalid time format. Use HH:MM (24-hour)",
        ));
    }

    if date < today {
        return Err(ApiError::validation("Appointment date cannot be in the past"));
    }

    let notes = req
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if notes
        .as_deref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
    {
        return Err(ApiError::validation(format!(
            "Notes cannot exceed {MAX_NOTES_LEN} characters"
        )));
    }

    Ok(ValidBooking {
        date,
        time: time.to_string(),
        notes,
    })
}

pub fn parse_decision(status: &str) -> Result<AppointmentEvent, ApiError> {
    AppointmentStatus::parse(status.trim())
        .and_then(AppointmentEvent::decision)
        .ok_or_else(|| ApiError::validation("Status must be either confirmed or cancelled"))
}

async fn load_details(state: &AppState, appointment_id: Uuid) -> Result<AppointmentDetails, ApiError> {
    state
        .store
        .appointment_details(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))
}

/// Error for a conditional write that matched nothing: someone else moved
/// the appointment first.
async fn lost_race(state: &AppState, appointment_id: Uuid) -> ApiError {
    match state.store.find_appointment(appointment_id).await {
        Ok(Some(current)) => {
            ApiError::conflict(format!("Appointment is already {}", current.status))
        }
        Ok(None) => ApiError::not_found("Appointment not found"),
        Err(e) => e.into(),
    }
}

/* ============================================================
   Booking
   ============================================================ */

pub async fn book_appointment(
    state: &AppState,
    patient: &PatientRow,
    patient_email: &str,
    doctor_id: Uuid,
    req: &BookingRequest,
    today: NaiveDate,
) -> Result<AppointmentDetails, ApiError> {
    let booking = validate_booking(req, today)?;

    let doctor = state
        .store
        .find_doctor(doctor_id)
        .await?
        .ok_or_else(|| ApiError::validation("Doctor not found"))?;

    let row = state
        .store
        .insert_appointment(NewAppointment {
            patient_id: patient.patient_id,
            doctor_id: doctor.doctor_id,
            appointment_date: booking.date,
            appointment_time: booking.time,
            notes: booking.notes,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::conflict("This time slot is already booked"),
            other => other.into(),
        })?;

    tracing::info!(
        appointment_id = %row.appointment_id,
        doctor_id = %row.doctor_id,
        patient_id = %row.patient_id,
        date = %row.appointment_date,
        time = %row.appointment_time,
        "appointment booked"
    );

    notifier::notify(
        state,
        Recipient::Doctor(doctor.doctor_id),
        notifier::NEW_APPOINTMENT_TITLE,
        notifier::booking_message(
            patient_email,
            &row.appointment_date.to_string(),
            &row.appointment_time,
        ),
        row.appointment_id,
    )
    .await?;

    load_details(state, row.appointment_id).await
}

/* ============================================================
   Doctor decision: confirm / cancel
   ============================================================ */

pub async fn update_status(
    state: &AppState,
    doctor: &DoctorRow,
    appointment_id: Uuid,
    event: AppointmentEvent,
) -> Result<AppointmentDetails, ApiError> {
    let appt = state
        .store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    if appt.doctor_id != doctor.doctor_id {
        return Err(ApiError::forbidden(
            "You are not authorized to update this appointment",
        ));
    }

    let to = lifecycle::transition(appt.status, event)?;
    let token = (event == AppointmentEvent::Confirm).then(|| {
        verification_token(
            appt.appointment_id,
            appt.appointment_date,
            &appt.appointment_time,
        )
    });

    let Some(updated) = state
        .store
        .change_status(StatusChange {
            appointment_id,
            expected: event.sources().to_vec(),
            to,
            verification_token: token.clone(),
        })
        .await?
    else {
        return Err(lost_race(state, appointment_id).await);
    };

    tracing::info!(%appointment_id, from = %appt.status, to = %updated.status, "appointment status changed");

    notifier::notify(
        state,
        Recipient::Patient(updated.patient_id),
        notifier::STATUS_UPDATE_TITLE,
        notifier::status_message(
            &updated.appointment_date.to_string(),
            &updated.appointment_time,
            updated.status,
        ),
        appointment_id,
    )
    .await?;

    let details = load_details(state, appointment_id).await?;

    let qr = token.map(|verification_token| QrPayload {
        appointment_id,
        verification_token,
    });
    if let Err(e) = notifier::send_status_email(state, &details, qr.as_ref()).await {
        tracing::warn!(%appointment_id, error = %e, "status email not sent");
    }

    Ok(details)
}

/* ============================================================
   QR check-in
   ============================================================ */

pub async fn scan_qr(
    state: &AppState,
    doctor: &DoctorRow,
    scan: &QrPayload,
    today: NaiveDate,
) -> Result<AppointmentDetails, ApiError> {
    let appointment_id = scan.appointment_id;
    let appt = state
        .store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    if appt.verification_token.as_deref() != Some(scan.verification_token.as_str()) {
        tracing::warn!(%appointment_id, "verification token mismatch");
        return Err(ApiError::Unauthorized(
            "INVALID_TOKEN",
            "Invalid verification token".into(),
        ));
    }

    if appt.doctor_id != doctor.doctor_id {
        return Err(ApiError::forbidden(
            "You are not authorized to verify this appointment",
        ));
    }

    if appt.appointment_date != today {
        return Err(ApiError::validation("Appointment is not scheduled for today"));
    }

    let to = lifecycle::transition(appt.status, AppointmentEvent::CheckIn)?;

    let Some((updated, review)) = state
        .store
        .complete_with_review(
            StatusChange {
                appointment_id,
                expected: AppointmentEvent::CheckIn.sources().to_vec(),
                to,
                verification_token: None,
            },
            NewReview {
                appointment_id,
                doctor_id: appt.doctor_id,
                patient_id: appt.patient_id,
                review_token: generate_review_token(),
            },
        )
        .await?
    else {
        return Err(lost_race(state, appointment_id).await);
    };

    tracing::info!(%appointment_id, from = %appt.status, to = %updated.status, "appointment checked in");

    let details = load_details(state, appointment_id).await?;
    if let Err(e) = notifier::send_review_email(state, &details, &review.review_token).await {
        tracing::warn!(%appointment_id, error = %e, "review email not sent");
    }

    Ok(details)
}
