use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::mailer::Mailer;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Base URL of the web client; review links point here.
    pub frontend_url: String,
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/* -------------------------
   Enumerations (stored as smallint)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Doctor = 1,
    Admin = 2,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Gender {
    Male = 0,
    Female = 1,
    Other = 2,
}

/// Appointment lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Cancelled = 2,
    Completed = 3,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "completed" => Some(AppointmentStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum RecipientKind {
    Doctor = 0,
    Patient = 1,
}

/// Notification recipient: the kind selects which profile table the id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Doctor(Uuid),
    Patient(Uuid),
}

impl Recipient {
    pub fn kind(self) -> RecipientKind {
        match self {
            Recipient::Doctor(_) => RecipientKind::Doctor,
            Recipient::Patient(_) => RecipientKind::Patient,
        }
    }

    pub fn id(self) -> Uuid {
        match self {
            Recipient::Doctor(id) | Recipient::Patient(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum ReviewStatus {
    Pending = 0,
    Submitted = 1,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone_number: String,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub building_info: String,
    pub street_name: String,
    pub city_name: String,
    pub state_name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorRow {
    pub doctor_id: Uuid,
    pub user_id: Uuid,
    pub specialization: Option<String>,
    pub experience: Option<i32>,
    pub fees: Option<i32>,
    pub total_ratings: i64,
    pub rating_count: i64,
    pub average_rating: f64,
    pub building_info: Option<String>,
    pub street_name: Option<String>,
    pub city_name: Option<String>,
    pub state_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Doctor joined with the owning user's public fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorProfile {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub doctor: DoctorRow,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl DoctorProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistoryEntry {
    pub disease: Option<String>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub medical_history: Json<Vec<MedicalHistoryEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientProfile {
    pub user: UserRow,
    pub profile: PatientRow,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_kind: RecipientKind,
    pub title: String,
    pub message: String,
    pub appointment_id: Uuid,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewRow {
    pub review_id: Uuid,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub rating: i16,
    pub comment: String,
    pub is_anonymous: bool,
    pub review_status: ReviewStatus,
    #[serde(skip_serializing)]
    pub review_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub user_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionLookupRow {
    pub session_token_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

/* -------------------------
   Joined read models
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct DoctorBrief {
    pub doctor_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialization: Option<String>,
    pub fees: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientBrief {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Appointment with both parties resolved for display.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetails {
    pub appointment_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub doctor: DoctorBrief,
    pub patient: PatientBrief,
}

impl AppointmentDetails {
    pub fn doctor_name(&self) -> String {
        format!("{} {}", self.doctor.first_name, self.doctor.last_name)
    }
}
