//! Persistence seam. Every multi-step state change is expressed as a single
//! conditional write so concurrent requests cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    AppointmentDetails, AppointmentRow, AppointmentStatus, DoctorProfile, DoctorRow, Gender,
    Location, MedicalHistoryEntry, NotificationRow, PatientProfile, PatientRow, Recipient,
    ReviewRow, Role, SessionLookupRow, SessionTokenRow, UserRow,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Database(#[from] sqlx::Error),
    /// A uniqueness rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: String,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub role: Role,
}

/// Role-specific profile created together with the user.
#[derive(Debug, Clone)]
pub enum NewProfile {
    Doctor {
        specialization: Option<String>,
        experience: Option<i32>,
        fees: Option<i32>,
    },
    Patient {
        medical_history: Vec<MedicalHistoryEntry>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub medical_history: Option<Vec<MedicalHistoryEntry>>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub notes: Option<String>,
}

/// Compare-and-swap status change: applies only while the current status is
/// one of `expected`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub appointment_id: Uuid,
    pub expected: Vec<AppointmentStatus>,
    pub to: AppointmentStatus,
    /// Stored alongside the status when present.
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub review_token: String,
}

#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub rating: i16,
    pub comment: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /* users */
    async fn create_user(&self, user: NewUser, profile: NewProfile) -> StoreResult<UserRow>;
    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRow>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>>;

    /* doctors */
    async fn find_doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRow>>;
    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>>;
    async fn doctor_profile(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorProfile>>;
    async fn list_doctors(&self) -> StoreResult<Vec<DoctorProfile>>;
    async fn update_doctor_location(
        &self,
        doctor_id: Uuid,
        location: Location,
    ) -> StoreResult<Option<DoctorRow>>;

    /* patients */
    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>>;
    async fn update_patient(
        &self,
        patient_id: Uuid,
        update: PatientUpdate,
    ) -> StoreResult<Option<PatientProfile>>;

    /* appointments */
    /// Fails with `StoreError::Conflict` when the slot already has an active booking.
    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<AppointmentRow>;
    async fn find_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<AppointmentRow>>;
    async fn appointment_details(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<AppointmentDetails>>;
    /// Returns `None` when the appointment is missing or not in an expected status.
    async fn change_status(&self, change: StatusChange) -> StoreResult<Option<AppointmentRow>>;
    /// Newest-created first.
    async fn appointments_for(&self, party: Recipient) -> StoreResult<Vec<AppointmentDetails>>;
    /// `(date, status)` pairs for a doctor within `[from, to]`.
    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<(NaiveDate, AppointmentStatus)>>;

    /* notifications */
    async fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationRow>;
    /// Newest first.
    async fn list_notifications(
        &self,
        recipient: Recipient,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NotificationRow>>;
    async fn count_notifications(&self, recipient: Recipient) -> StoreResult<i64>;

    /* reviews */
    /// Applies `change` and opens the pending review as one unit. `None` when
    /// the status no longer matches; `StoreError::Conflict` when the
    /// appointment already has a review, in which case the status is untouched.
    async fn complete_with_review(
        &self,
        change: StatusChange,
        review: NewReview,
    ) -> StoreResult<Option<(AppointmentRow, ReviewRow)>>;
    async fn find_pending_review(&self, review_token: &str) -> StoreResult<Option<ReviewRow>>;
    /// Claims a pending review and folds the rating into the doctor's running
    /// average in one unit. `None` when the token is unknown or already used.
    async fn submit_review(
        &self,
        review_token: &str,
        submission: ReviewSubmission,
    ) -> StoreResult<Option<(ReviewRow, DoctorRow)>>;

    /* sessions */
    async fn create_session(&self, new: NewSession) -> StoreResult<SessionTokenRow>;
    async fn find_active_session(
        &self,
        access_token_hash: &str,
    ) -> StoreResult<Option<SessionLookupRow>>;
    /// Replaces the access token of a live session found by its refresh token.
    async fn rotate_access_token(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        access_expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<SessionTokenRow>>;
    async fn revoke_session(&self, session_token_id: Uuid) -> StoreResult<bool>;
}
