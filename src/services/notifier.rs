// src/services/notifier.rs
//
// In-app notifications and the two workflow emails. Notification writes are
// part of the request; email sends return their error so callers can log and
// move on.

use uuid::Uuid;

use crate::error::ApiError;
use crate::mailer::{Attachment, Email};
use crate::models::{AppState, AppointmentDetails, AppointmentStatus, NotificationRow, Recipient};
use crate::services::templates::{
    StatusEmailView, render_review_email, render_status_email, status_subject,
};
use crate::store::NewNotification;
use crate::tokens::QrPayload;

pub const NEW_APPOINTMENT_TITLE: &str = "New Appointment Request";
pub const STATUS_UPDATE_TITLE: &str = "Appointment Status Update";
pub const REVIEW_SUBJECT: &str = "Rate Your Recent Appointment";

pub async fn notify(
    state: &AppState,
    recipient: Recipient,
    title: &str,
    message: String,
    appointment_id: Uuid,
) -> Result<NotificationRow, ApiError> {
    let row = state
        .store
        .insert_notification(NewNotification {
            recipient,
            title: title.to_string(),
            message,
            appointment_id,
        })
        .await?;

    tracing::debug!(
        notification_id = %row.notification_id,
        recipient_kind = ?row.recipient_kind,
        recipient_id = %row.recipient_id,
        "notification stored"
    );
    Ok(row)
}

pub fn booking_message(patient_email: &str, date: &str, time: &str) -> String {
    format!(
        "You have a new appointment request from {patient_email} for {date} on {time} time slot"
    )
}

pub fn status_message(date: &str, time: &str, status: AppointmentStatus) -> String {
    format!("Your appointment on {date} at {time} has been {status}")
}

pub fn review_link(frontend_url: &str, review_token: &str) -> String {
    format!("{}/review/{review_token}", frontend_url.trim_end_matches('/'))
}

/// Confirmation or cancellation mail to the patient. A QR payload is only
/// embedded for confirmations.
pub async fn send_status_email(
    state: &AppState,
    appt: &AppointmentDetails,
    qr: Option<&QrPayload>,
) -> anyhow::Result<()> {
    let doctor_name = appt.doctor_name();
    let date = appt.appointment_date.to_string();
    let appointment_id = appt.appointment_id.to_string();

    let html = render_status_email(&StatusEmailView {
        status: appt.status,
        doctor_name: &doctor_name,
        date: &date,
        time: &appt.appointment_time,
        appointment_id: &appointment_id,
    });

    let email = Email {
        to: appt.patient.email.clone(),
        subject: status_subject(appt.status),
        attachments: vec![Attachment {
            filename: format!("appointment-{}.html", appt.status),
            content_type: "text/html".into(),
            content: html.clone(),
        }],
        html,
        inline_qr: qr.map(QrPayload::to_json),
    };

    state.mailer.send(email).await
}

pub async fn send_review_email(
    state: &AppState,
    appt: &AppointmentDetails,
    review_token: &str,
) -> anyhow::Result<()> {
    let link = review_link(&state.frontend_url, review_token);
    let email = Email {
        to: appt.patient.email.clone(),
        subject: REVIEW_SUBJECT.to_string(),
        html: render_review_email(&appt.doctor_name(), &link),
        attachments: vec![],
        inline_qr: None,
    };

    state.mailer.send(email).await
}
