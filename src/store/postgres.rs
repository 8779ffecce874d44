// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    NewAppointment, NewNotification, NewProfile, NewReview, NewSession, NewUser, PatientUpdate,
    ReviewSubmission, StatusChange, Store, StoreError, StoreResult,
};
use crate::models::{
    AppointmentDetails, AppointmentRow, AppointmentStatus, DoctorBrief, DoctorProfile, DoctorRow,
    Location, NotificationRow, PatientBrief, PatientProfile, PatientRow, Recipient, ReviewRow,
    SessionLookupRow, SessionTokenRow, UserRow,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = r#"
    user_id, first_name, last_name, email, password_hash, phone_number, age, gender, role, created_at
"#;

const DOCTOR_COLUMNS: &str = r#"
    d.doctor_id, d.user_id, d.specialization, d.experience, d.fees,
    d.total_ratings, d.rating_count, d.average_rating,
    d.building_info, d.street_name, d.city_name, d.state_name, d.created_at
"#;

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, patient_id, doctor_id, appointment_date, appointment_time,
    status, notes, verification_token, created_at, updated_at
"#;

const NOTIFICATION_COLUMNS: &str = r#"
    notification_id, recipient_id, recipient_kind, title, message, appointment_id, is_read, created_at
"#;

const REVIEW_COLUMNS: &str = r#"
    review_id, appointment_id, doctor_id, patient_id, rating, comment,
    is_anonymous, review_status, review_token, created_at, updated_at
"#;

const SESSION_COLUMNS: &str = r#"
    session_token_id, user_id, access_expires_at, refresh_expires_at
"#;

const DETAILS_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.appointment_date,
      a.appointment_time,
      a.status,
      a.notes,
      a.created_at,
      a.updated_at,

      d.doctor_id,
      du.first_name AS d_first,
      du.last_name  AS d_last,
      du.email      AS d_email,
      d.specialization AS d_specialization,
      d.fees AS d_fees,

      p.patient_id,
      pu.first_name AS p_first,
      pu.last_name  AS p_last,
      pu.email      AS p_email

    FROM appointment a
    JOIN doctor d    ON d.doctor_id = a.doctor_id
    JOIN app_user du ON du.user_id = d.user_id
    JOIN patient p   ON p.patient_id = a.patient_id
    JOIN app_user pu ON pu.user_id = p.user_id
"#;

#[derive(Debug, FromRow)]
struct DetailsRow {
    appointment_id: Uuid,
    appointment_date: NaiveDate,
    appointment_time: String,
    status: AppointmentStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    doctor_id: Uuid,
    d_first: String,
    d_last: String,
    d_email: String,
    d_specialization: Option<String>,
    d_fees: Option<i32>,
    patient_id: Uuid,
    p_first: String,
    p_last: String,
    p_email: String,
}

impl From<DetailsRow> for AppointmentDetails {
    fn from(r: DetailsRow) -> Self {
        AppointmentDetails {
            appointment_id: r.appointment_id,
            appointment_date: r.appointment_date,
            appointment_time: r.appointment_time,
            status: r.status,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
            doctor: DoctorBrief {
                doctor_id: r.doctor_id,
                first_name: r.d_first,
                last_name: r.d_last,
                email: r.d_email,
                specialization: r.d_specialization,
                fees: r.d_fees,
            },
            patient: PatientBrief {
                patient_id: r.patient_id,
                first_name: r.p_first,
                last_name: r.p_last,
                email: r.p_email,
            },
        }
    }
}

/// Compare-and-swap on status; `$2` is the expected set.
const STATUS_CAS: &str = r#"
UPDATE appointment
SET status = $3,
    verification_token = COALESCE($4, verification_token),
    updated_at = now()
WHERE appointment_id = $1
  AND status = ANY($2)
"#;

/// Maps unique-index violations to `StoreError::Conflict`.
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Conflict(what.to_string());
        }
    }
    StoreError::Database(e)
}

impl PgStore {
    async fn load_patient_profile(&self, patient_id: Uuid) -> StoreResult<Option<PatientProfile>> {
        let profile: Option<PatientRow> = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT patient_id, user_id, medical_history
            FROM patient
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(profile) = profile else {
            return Ok(None);
        };

        let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE user_id = $1"
        ))
        .bind(profile.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(PatientProfile { user, profile }))
    }
}

#[async_trait]
impl Store for PgStore {
    /* ============================================================
       Users
       ============================================================ */

    async fn create_user(&self, user: NewUser, profile: NewProfile) -> StoreResult<UserRow> {
        let mut tx = self.pool.begin().await?;

        let row: UserRow = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO app_user
                (first_name, last_name, email, password_hash, phone_number, age, gender, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone_number)
        .bind(user.age)
        .bind(user.gender.map(|g| g as i16))
        .bind(user.role as i16)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "email already registered"))?;

        match profile {
            NewProfile::Doctor {
                specialization,
                experience,
                fees,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO doctor (user_id, specialization, experience, fees)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(row.user_id)
                .bind(specialization)
                .bind(experience)
                .bind(fees)
                .execute(&mut *tx)
                .await?;
            }
            NewProfile::Patient { medical_history } => {
                sqlx::query(
                    r#"
                    INSERT INTO patient (user_id, medical_history)
                    VALUES ($1, $2)
                    "#,
                )
                .bind(row.user_id)
                .bind(Json(medical_history))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /* ============================================================
       Doctors
       ============================================================ */

    async fn find_doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor d WHERE d.doctor_id = $1"
        ))
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor d WHERE d.user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn doctor_profile(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorProfile>> {
        let row = sqlx::query_as::<_, DoctorProfile>(&format!(
            r#"
            SELECT {DOCTOR_COLUMNS}, u.first_name, u.last_name, u.email
            FROM doctor d
            JOIN app_user u ON u.user_id = d.user_id
            WHERE d.doctor_id = $1
            "#
        ))
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_doctors(&self) -> StoreResult<Vec<DoctorProfile>> {
        let rows = sqlx::query_as::<_, DoctorProfile>(&format!(
            r#"
            SELECT {DOCTOR_COLUMNS}, u.first_name, u.last_name, u.email
            FROM doctor d
            JOIN app_user u ON u.user_id = d.user_id
            ORDER BY u.last_name ASC, u.first_name ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_doctor_location(
        &self,
        doctor_id: Uuid,
        location: Location,
    ) -> StoreResult<Option<DoctorRow>> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            r#"
            UPDATE doctor d
            SET building_info = $2,
                street_name   = $3,
                city_name     = $4,
                state_name    = $5,
                updated_at    = now()
            WHERE d.doctor_id = $1
            RETURNING {DOCTOR_COLUMNS}
            "#
        ))
        .bind(doctor_id)
        .bind(location.building_info)
        .bind(location.street_name)
        .bind(location.city_name)
        .bind(location.state_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /* ============================================================
       Patients
       ============================================================ */

    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT patient_id, user_id, medical_history
            FROM patient
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_patient(
        &self,
        patient_id: Uuid,
        update: PatientUpdate,
    ) -> StoreResult<Option<PatientProfile>> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT user_id FROM patient WHERE patient_id = $1 FOR UPDATE"#)
                .bind(patient_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE app_user
            SET
              first_name   = COALESCE($2, first_name),
              last_name    = COALESCE($3, last_name),
              age          = COALESCE($4, age),
              gender       = COALESCE($5, gender),
              phone_number = COALESCE($6, phone_number),
              email        = COALESCE($7, email),
              updated_at   = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.age)
        .bind(update.gender.map(|g| g as i16))
        .bind(update.phone_number)
        .bind(update.email)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "email already registered"))?;

        if let Some(history) = update.medical_history {
            sqlx::query(r#"UPDATE patient SET medical_history = $2 WHERE patient_id = $1"#)
                .bind(patient_id)
                .bind(Json(history))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.load_patient_profile(patient_id).await
    }

    /* ============================================================
       Appointments
       ============================================================ */

    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<AppointmentRow> {
        // appointment_active_slot rejects a second non-cancelled booking
        sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            INSERT INTO appointment
                (patient_id, doctor_id, appointment_date, appointment_time, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(new.appointment_date)
        .bind(&new.appointment_time)
        .bind(AppointmentStatus::Pending as i16)
        .bind(new.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "slot already booked"))
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<AppointmentRow>> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn appointment_details(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<AppointmentDetails>> {
        let row = sqlx::query_as::<_, DetailsRow>(&format!(
            "{DETAILS_SELECT} WHERE a.appointment_id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AppointmentDetails::from))
    }

    async fn change_status(&self, change: StatusChange) -> StoreResult<Option<AppointmentRow>> {
        let expected: Vec<i16> = change.expected.iter().map(|s| *s as i16).collect();

        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{STATUS_CAS} RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(change.appointment_id)
        .bind(expected)
        .bind(change.to as i16)
        .bind(change.verification_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn appointments_for(&self, party: Recipient) -> StoreResult<Vec<AppointmentDetails>> {
        let filter = match party {
            Recipient::Doctor(_) => "a.doctor_id",
            Recipient::Patient(_) => "a.patient_id",
        };

        let rows = sqlx::query_as::<_, DetailsRow>(&format!(
            "{DETAILS_SELECT} WHERE {filter} = $1 ORDER BY a.created_at DESC"
        ))
        .bind(party.id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AppointmentDetails::from).collect())
    }

    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<(NaiveDate, AppointmentStatus)>> {
        let rows: Vec<(NaiveDate, AppointmentStatus)> = sqlx::query_as(
            r#"
            SELECT appointment_date, status
            FROM appointment
            WHERE doctor_id = $1
              AND appointment_date >= $2
              AND appointment_date <= $3
            ORDER BY appointment_date ASC
            "#,
        )
        .bind(doctor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /* ============================================================
       Notifications
       ============================================================ */

    async fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationRow> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notification (recipient_id, recipient_kind, title, message, appointment_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(new.recipient.id())
        .bind(new.recipient.kind() as i16)
        .bind(new.title)
        .bind(new.message)
        .bind(new.appointment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NotificationRow>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notification
            WHERE recipient_kind = $1
              AND recipient_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(recipient.kind() as i16)
        .bind(recipient.id())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_notifications(&self, recipient: Recipient) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notification
            WHERE recipient_kind = $1
              AND recipient_id = $2
            "#,
        )
        .bind(recipient.kind() as i16)
        .bind(recipient.id())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /* ============================================================
       Reviews
       ============================================================ */

    async fn complete_with_review(
        &self,
        change: StatusChange,
        review: NewReview,
    ) -> StoreResult<Option<(AppointmentRow, ReviewRow)>> {
        let expected: Vec<i16> = change.expected.iter().map(|s| *s as i16).collect();
        let mut tx = self.pool.begin().await?;

        let appointment: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{STATUS_CAS} RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(change.appointment_id)
        .bind(expected)
        .bind(change.to as i16)
        .bind(change.verification_token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(appointment) = appointment else {
            return Ok(None);
        };

        // dropping tx on error rolls the status change back
        let review: ReviewRow = sqlx::query_as::<_, ReviewRow>(&format!(
            r#"
            INSERT INTO review (appointment_id, doctor_id, patient_id, review_token)
            VALUES ($1, $2, $3, $4)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review.appointment_id)
        .bind(review.doctor_id)
        .bind(review.patient_id)
        .bind(review.review_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "review already exists"))?;

        tx.commit().await?;
        Ok(Some((appointment, review)))
    }

    async fn find_pending_review(&self, review_token: &str) -> StoreResult<Option<ReviewRow>> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM review
            WHERE review_token = $1
              AND review_status = 0
            "#
        ))
        .bind(review_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn submit_review(
        &self,
        review_token: &str,
        submission: ReviewSubmission,
    ) -> StoreResult<Option<(ReviewRow, DoctorRow)>> {
        let mut tx = self.pool.begin().await?;

        let review: Option<ReviewRow> = sqlx::query_as::<_, ReviewRow>(&format!(
            r#"
            UPDATE review
            SET rating = $2,
                comment = $3,
                is_anonymous = $4,
                review_status = 1,
                updated_at = now()
            WHERE review_token = $1
              AND review_status = 0
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_token)
        .bind(submission.rating)
        .bind(&submission.comment)
        .bind(submission.is_anonymous)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(review) = review else {
            return Ok(None);
        };

        // SET expressions see the pre-update totals
        let doctor: DoctorRow = sqlx::query_as::<_, DoctorRow>(&format!(
            r#"
            UPDATE doctor d
            SET average_rating = (d.total_ratings + $2)::float8 / (d.rating_count + 1),
                total_ratings  = d.total_ratings + $2,
                rating_count   = d.rating_count + 1,
                updated_at     = now()
            WHERE d.doctor_id = $1
            RETURNING {DOCTOR_COLUMNS}
            "#
        ))
        .bind(review.doctor_id)
        .bind(i64::from(submission.rating))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((review, doctor)))
    }

    /* ============================================================
       Sessions
       ============================================================ */

    async fn create_session(&self, new: NewSession) -> StoreResult<SessionTokenRow> {
        let row = sqlx::query_as::<_, SessionTokenRow>(&format!(
            r#"
            INSERT INTO session_token
                (user_id, access_token_hash, refresh_token_hash, access_expires_at, refresh_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.access_token_hash)
        .bind(new.refresh_token_hash)
        .bind(new.access_expires_at)
        .bind(new.refresh_expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_active_session(
        &self,
        access_token_hash: &str,
    ) -> StoreResult<Option<SessionLookupRow>> {
        // Lookup and last_seen_at touch in one statement
        let row = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            UPDATE session_token st
            SET last_seen_at = now()
            FROM app_user u
            WHERE u.user_id = st.user_id
              AND st.access_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.access_expires_at > now()
            RETURNING st.session_token_id, st.user_id, u.role
            "#,
        )
        .bind(access_token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn rotate_access_token(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        access_expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<SessionTokenRow>> {
        let row = sqlx::query_as::<_, SessionTokenRow>(&format!(
            r#"
            UPDATE session_token
            SET access_token_hash = $2,
                access_expires_at = $3,
                last_seen_at = now()
            WHERE refresh_token_hash = $1
              AND revoked_at IS NULL
              AND refresh_expires_at > now()
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(refresh_token_hash)
        .bind(new_access_token_hash)
        .bind(access_expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn revoke_session(&self, session_token_id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE session_token
            SET revoked_at = now()
            WHERE session_token_id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(session_token_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
