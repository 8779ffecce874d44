// src/services/listing.rs
//
// Read paths: own appointments, paginated notifications, monthly calendar.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::models::{AppState, AppointmentDetails, AppointmentStatus, NotificationRow, Recipient, Role};

pub const NOTIFICATION_PAGE_SIZE: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub page: i64,
    pub total_pages: i64,
    pub notifications: Vec<NotificationRow>,
}

/// Day of month -> statuses seen that day.
pub type CalendarMonth = BTreeMap<u32, BTreeSet<AppointmentStatus>>;

/// Which profile the caller acts as. Doctors resolve to their doctor row,
/// everyone else to a patient row.
pub async fn resolve_party(state: &AppState, auth: &AuthContext) -> Result<Recipient, ApiError> {
    let party = if auth.role == Role::Doctor {
        state
            .store
            .find_doctor_by_user(auth.user_id)
            .await?
            .map(|d| Recipient::Doctor(d.doctor_id))
    } else {
        state
            .store
            .find_patient_by_user(auth.user_id)
            .await?
            .map(|p| Recipient::Patient(p.patient_id))
    };
    party.ok_or_else(|| ApiError::not_found("User is neither a doctor nor a patient"))
}

pub async fn list_appointments(
    state: &AppState,
    party: Recipient,
) -> Result<Vec<AppointmentDetails>, ApiError> {
    Ok(state.store.appointments_for(party).await?)
}

/// Anything unparsable or below 1 means the first page.
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    (total + page_size - 1) / page_size
}

pub async fn list_notifications(
    state: &AppState,
    party: Recipient,
    page: i64,
) -> Result<NotificationPage, ApiError> {
    let offset = (page - 1).saturating_mul(NOTIFICATION_PAGE_SIZE);
    let notifications = state
        .store
        .list_notifications(party, NOTIFICATION_PAGE_SIZE, offset)
        .await?;
    let total = state.store.count_notifications(party).await?;

    Ok(NotificationPage {
        page,
        total_pages: total_pages(total, NOTIFICATION_PAGE_SIZE),
        notifications,
    })
}

/// First and last day of the month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

pub fn parse_year_month(q: &CalendarQuery) -> Result<(i32, u32), ApiError> {
    let (Some(year), Some(month)) = (q.year.as_deref(), q.month.as_deref()) else {
        return Err(ApiError::validation("Year and month are required"));
    };
    let year = year
        .trim()
        .parse::<i32>()
        .map_err(|_| ApiError::validation("year must be a number"))?;
    let month = month
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| ApiError::validation("month must be between 1 and 12"))?;
    Ok((year, month))
}

pub fn group_by_day(rows: impl IntoIterator<Item = (NaiveDate, AppointmentStatus)>) -> CalendarMonth {
    let mut out = CalendarMonth::new();
    for (date, status) in rows {
        out.entry(date.day()).or_default().insert(status);
    }
    out
}

pub async fn calendar(
    state: &AppState,
    doctor_id: Uuid,
    year: i32,
    month: u32,
) -> Result<CalendarMonth, ApiError> {
    let (from, to) = month_bounds(year, month)
        .ok_or_else(|| ApiError::validation("Invalid year or month"))?;
    let rows = state.store.doctor_schedule(doctor_id, from, to).await?;
    Ok(group_by_day(rows))
}
