// src/store/memory.rs
//
// In-process Store for tests. One mutex guards all tables, so each method
// is atomic the same way the Postgres statements are.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{
    NewAppointment, NewNotification, NewProfile, NewReview, NewSession, NewUser, PatientUpdate,
    ReviewSubmission, StatusChange, Store, StoreError, StoreResult,
};
use crate::models::{
    AppointmentDetails, AppointmentRow, AppointmentStatus, DoctorBrief, DoctorProfile, DoctorRow,
    Location, NotificationRow, PatientBrief, PatientProfile, PatientRow, Recipient, ReviewRow,
    ReviewStatus, SessionLookupRow, SessionTokenRow, UserRow,
};

struct SessionEntry {
    row: SessionTokenRow,
    access_token_hash: String,
    refresh_token_hash: String,
    revoked: bool,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRow>,
    doctors: Vec<DoctorRow>,
    patients: Vec<PatientRow>,
    appointments: Vec<AppointmentRow>,
    notifications: Vec<NotificationRow>,
    reviews: Vec<ReviewRow>,
    sessions: Vec<SessionEntry>,
}

impl Tables {
    fn user(&self, user_id: Uuid) -> Option<&UserRow> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    fn doctor_profile(&self, doctor: &DoctorRow) -> Option<DoctorProfile> {
        let user = self.user(doctor.user_id)?;
        Some(DoctorProfile {
            doctor: doctor.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        })
    }

    fn patient_profile(&self, patient_id: Uuid) -> Option<PatientProfile> {
        let profile = self.patients.iter().find(|p| p.patient_id == patient_id)?;
        let user = self.user(profile.user_id)?;
        Some(PatientProfile {
            user: user.clone(),
            profile: profile.clone(),
        })
    }

    fn details(&self, a: &AppointmentRow) -> Option<AppointmentDetails> {
        let doctor = self.doctors.iter().find(|d| d.doctor_id == a.doctor_id)?;
        let doctor_user = self.user(doctor.user_id)?;
        let patient = self.patients.iter().find(|p| p.patient_id == a.patient_id)?;
        let patient_user = self.user(patient.user_id)?;

        Some(AppointmentDetails {
            appointment_id: a.appointment_id,
            appointment_date: a.appointment_date,
            appointment_time: a.appointment_time.clone(),
            status: a.status,
            notes: a.notes.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
            doctor: DoctorBrief {
                doctor_id: doctor.doctor_id,
                first_name: doctor_user.first_name.clone(),
                last_name: doctor_user.last_name.clone(),
                email: doctor_user.email.clone(),
                specialization: doctor.specialization.clone(),
                fees: doctor.fees,
            },
            patient: PatientBrief {
                patient_id: patient.patient_id,
                first_name: patient_user.first_name.clone(),
                last_name: patient_user.last_name.clone(),
                email: patient_user.email.clone(),
            },
        })
    }

    fn push_review(&mut self, new: NewReview) -> StoreResult<ReviewRow> {
        if self.reviews.iter().any(|r| {
            r.appointment_id == new.appointment_id || r.review_token == new.review_token
        }) {
            return Err(StoreError::Conflict("review already exists".into()));
        }

        let now = Utc::now();
        let row = ReviewRow {
            review_id: Uuid::new_v4(),
            appointment_id: new.appointment_id,
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            rating: 0,
            comment: String::new(),
            is_anonymous: false,
            review_status: ReviewStatus::Pending,
            review_token: new.review_token,
            created_at: now,
            updated_at: now,
        };
        self.reviews.push(row.clone());
        Ok(row)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.user_id) != except)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Test hook: open a review without touching any appointment.
    pub fn seed_review(&self, new: NewReview) -> StoreResult<ReviewRow> {
        self.lock().push_review(new)
    }

    pub fn review_for_appointment(&self, appointment_id: Uuid) -> Option<ReviewRow> {
        self.lock()
            .reviews
            .iter()
            .find(|r| r.appointment_id == appointment_id)
            .cloned()
    }

    /// Test hook: seed a doctor's rating counters.
    pub fn set_doctor_ratings(&self, doctor_id: Uuid, total: i64, count: i64) {
        let mut t = self.lock();
        if let Some(d) = t.doctors.iter_mut().find(|d| d.doctor_id == doctor_id) {
            d.total_ratings = total;
            d.rating_count = count;
            d.average_rating = if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            };
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser, profile: NewProfile) -> StoreResult<UserRow> {
        let mut t = self.lock();
        if t.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("email already registered".into()));
        }

        let now = Utc::now();
        let row = UserRow {
            user_id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            phone_number: user.phone_number,
            age: user.age,
            gender: user.gender,
            role: user.role,
            created_at: now,
        };

        match profile {
            NewProfile::Doctor {
                specialization,
                experience,
                fees,
            } => t.doctors.push(DoctorRow {
                doctor_id: Uuid::new_v4(),
                user_id: row.user_id,
                specialization,
                experience,
                fees,
                total_ratings: 0,
                rating_count: 0,
                average_rating: 0.0,
                building_info: None,
                street_name: None,
                city_name: None,
                state_name: None,
                created_at: now,
            }),
            NewProfile::Patient { medical_history } => t.patients.push(PatientRow {
                patient_id: Uuid::new_v4(),
                user_id: row.user_id,
                medical_history: Json(medical_history),
            }),
        }

        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRow>> {
        Ok(self.lock().user(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        Ok(self
            .lock()
            .doctors
            .iter()
            .find(|d| d.doctor_id == doctor_id)
            .cloned())
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        Ok(self
            .lock()
            .doctors
            .iter()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn doctor_profile(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorProfile>> {
        let t = self.lock();
        Ok(t
            .doctors
            .iter()
            .find(|d| d.doctor_id == doctor_id)
            .and_then(|d| t.doctor_profile(d)))
    }

    async fn list_doctors(&self) -> StoreResult<Vec<DoctorProfile>> {
        let t = self.lock();
        let mut rows: Vec<DoctorProfile> =
            t.doctors.iter().filter_map(|d| t.doctor_profile(d)).collect();
        rows.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(rows)
    }

    async fn update_doctor_location(
        &self,
        doctor_id: Uuid,
        location: Location,
    ) -> StoreResult<Option<DoctorRow>> {
        let mut t = self.lock();
        let Some(d) = t.doctors.iter_mut().find(|d| d.doctor_id == doctor_id) else {
            return Ok(None);
        };
        d.building_info = Some(location.building_info);
        d.street_name = Some(location.street_name);
        d.city_name = Some(location.city_name);
        d.state_name = Some(location.state_name);
        Ok(Some(d.clone()))
    }

    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>> {
        Ok(self
            .lock()
            .patients
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn update_patient(
        &self,
        patient_id: Uuid,
        update: PatientUpdate,
    ) -> StoreResult<Option<PatientProfile>> {
        let mut t = self.lock();
        let Some(user_id) = t
            .patients
            .iter()
            .find(|p| p.patient_id == patient_id)
            .map(|p| p.user_id)
        else {
            return Ok(None);
        };

        if let Some(email) = update.email.as_deref() {
            if t.email_taken(email, Some(user_id)) {
                return Err(StoreError::Conflict("email already registered".into()));
            }
        }

        if let Some(u) = t.users.iter_mut().find(|u| u.user_id == user_id) {
            if let Some(v) = update.first_name {
                u.first_name = v;
            }
            if let Some(v) = update.last_name {
                u.last_name = v;
            }
            if let Some(v) = update.age {
                u.age = Some(v);
            }
            if let Some(v) = update.gender {
                u.gender = Some(v);
            }
            if let Some(v) = update.phone_number {
                u.phone_number = v;
            }
            if let Some(v) = update.email {
                u.email = v;
            }
        }

        if let Some(history) = update.medical_history {
            if let Some(p) = t.patients.iter_mut().find(|p| p.patient_id == patient_id) {
                p.medical_history = Json(history);
            }
        }

        Ok(t.patient_profile(patient_id))
    }

    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<AppointmentRow> {
        let mut t = self.lock();
        let taken = t.appointments.iter().any(|a| {
            a.doctor_id == new.doctor_id
                && a.appointment_date == new.appointment_date
                && a.appointment_time == new.appointment_time
                && a.status != AppointmentStatus::Cancelled
        });
        if taken {
            return Err(StoreError::Conflict("slot already booked".into()));
        }

        let now = Utc::now();
        let row = AppointmentRow {
            appointment_id: Uuid::new_v4(),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            appointment_date: new.appointment_date,
            appointment_time: new.appointment_time,
            status: AppointmentStatus::Pending,
            notes: new.notes,
            verification_token: None,
            created_at: now,
            updated_at: now,
        };
        t.appointments.push(row.clone());
        Ok(row)
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<AppointmentRow>> {
        Ok(self
            .lock()
            .appointments
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .cloned())
    }

    async fn appointment_details(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<AppointmentDetails>> {
        let t = self.lock();
        Ok(t
            .appointments
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .and_then(|a| t.details(a)))
    }

    async fn change_status(&self, change: StatusChange) -> StoreResult<Option<AppointmentRow>> {
        let mut t = self.lock();
        let Some(a) = t
            .appointments
            .iter_mut()
            .find(|a| a.appointment_id == change.appointment_id)
        else {
            return Ok(None);
        };
        if !change.expected.contains(&a.status) {
            return Ok(None);
        }

        a.status = change.to;
        if change.verification_token.is_some() {
            a.verification_token = change.verification_token;
        }
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn appointments_for(&self, party: Recipient) -> StoreResult<Vec<AppointmentDetails>> {
        let t = self.lock();
        // reverse insertion order so equal timestamps still list newest first
        let mut rows: Vec<AppointmentDetails> = t
            .appointments
            .iter()
            .rev()
            .filter(|a| match party {
                Recipient::Doctor(id) => a.doctor_id == id,
                Recipient::Patient(id) => a.patient_id == id,
            })
            .filter_map(|a| t.details(a))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<(NaiveDate, AppointmentStatus)>> {
        let t = self.lock();
        let mut rows: Vec<(NaiveDate, AppointmentStatus)> = t
            .appointments
            .iter()
            .filter(|a| {
                a.doctor_id == doctor_id && a.appointment_date >= from && a.appointment_date <= to
            })
            .map(|a| (a.appointment_date, a.status))
            .collect();
        rows.sort_by_key(|(date, _)| *date);
        Ok(rows)
    }

    async fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationRow> {
        let row = NotificationRow {
            notification_id: Uuid::new_v4(),
            recipient_id: new.recipient.id(),
            recipient_kind: new.recipient.kind(),
            title: new.title,
            message: new.message,
            appointment_id: new.appointment_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.lock().notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NotificationRow>> {
        let t = self.lock();
        let mut rows: Vec<NotificationRow> = t
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_kind == recipient.kind() && n.recipient_id == recipient.id())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_notifications(&self, recipient: Recipient) -> StoreResult<i64> {
        let t = self.lock();
        Ok(t.notifications
            .iter()
            .filter(|n| n.recipient_kind == recipient.kind() && n.recipient_id == recipient.id())
            .count() as i64)
    }

    async fn complete_with_review(
        &self,
        change: StatusChange,
        review: NewReview,
    ) -> StoreResult<Option<(AppointmentRow, ReviewRow)>> {
        let mut t = self.lock();
        let Some(idx) = t
            .appointments
            .iter()
            .position(|a| a.appointment_id == change.appointment_id)
        else {
            return Ok(None);
        };
        if !change.expected.contains(&t.appointments[idx].status) {
            return Ok(None);
        }

        // review first, so a conflict leaves the status as it was
        let review = t.push_review(review)?;

        let a = &mut t.appointments[idx];
        a.status = change.to;
        if change.verification_token.is_some() {
            a.verification_token = change.verification_token;
        }
        a.updated_at = Utc::now();
        Ok(Some((a.clone(), review)))
    }

    async fn find_pending_review(&self, review_token: &str) -> StoreResult<Option<ReviewRow>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .find(|r| r.review_token == review_token && r.review_status == ReviewStatus::Pending)
            .cloned())
    }

    async fn submit_review(
        &self,
        review_token: &str,
        submission: ReviewSubmission,
    ) -> StoreResult<Option<(ReviewRow, DoctorRow)>> {
        let mut t = self.lock();
        let Some(review) = t
            .reviews
            .iter_mut()
            .find(|r| r.review_token == review_token && r.review_status == ReviewStatus::Pending)
        else {
            return Ok(None);
        };

        review.rating = submission.rating;
        review.comment = submission.comment;
        review.is_anonymous = submission.is_anonymous;
        review.review_status = ReviewStatus::Submitted;
        review.updated_at = Utc::now();
        let review = review.clone();

        let Some(doctor) = t
            .doctors
            .iter_mut()
            .find(|d| d.doctor_id == review.doctor_id)
        else {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        };

        let rating = i64::from(submission.rating);
        doctor.average_rating =
            (doctor.total_ratings + rating) as f64 / (doctor.rating_count + 1) as f64;
        doctor.total_ratings += rating;
        doctor.rating_count += 1;

        Ok(Some((review, doctor.clone())))
    }

    async fn create_session(&self, new: NewSession) -> StoreResult<SessionTokenRow> {
        let row = SessionTokenRow {
            session_token_id: Uuid::new_v4(),
            user_id: new.user_id,
            access_expires_at: new.access_expires_at,
            refresh_expires_at: new.refresh_expires_at,
        };
        self.lock().sessions.push(SessionEntry {
            row: row.clone(),
            access_token_hash: new.access_token_hash,
            refresh_token_hash: new.refresh_token_hash,
            revoked: false,
        });
        Ok(row)
    }

    async fn find_active_session(
        &self,
        access_token_hash: &str,
    ) -> StoreResult<Option<SessionLookupRow>> {
        let t = self.lock();
        let now = Utc::now();
        let Some(s) = t.sessions.iter().find(|s| {
            s.access_token_hash == access_token_hash && !s.revoked && s.row.access_expires_at > now
        }) else {
            return Ok(None);
        };
        Ok(t.user(s.row.user_id).map(|u| SessionLookupRow {
            session_token_id: s.row.session_token_id,
            user_id: u.user_id,
            role: u.role,
        }))
    }

    async fn rotate_access_token(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        access_expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<SessionTokenRow>> {
        let mut t = self.lock();
        let now = Utc::now();
        let Some(s) = t.sessions.iter_mut().find(|s| {
            s.refresh_token_hash == refresh_token_hash
                && !s.revoked
                && s.row.refresh_expires_at > now
        }) else {
            return Ok(None);
        };
        s.access_token_hash = new_access_token_hash.to_string();
        s.row.access_expires_at = access_expires_at;
        Ok(Some(s.row.clone()))
    }

    async fn revoke_session(&self, session_token_id: Uuid) -> StoreResult<bool> {
        let mut t = self.lock();
        match t
            .sessions
            .iter_mut()
            .find(|s| s.row.session_token_id == session_token_id && !s.revoked)
        {
            Some(s) => {
                s.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
