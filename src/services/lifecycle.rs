//! Appointment state machine.
//!
//! ```text
//! pending --confirm--> confirmed --check_in--> completed
//! pending --cancel---> cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Check-in is also accepted from
//! `pending`; in practice it is unreachable there because the verification
//! token only exists once the appointment has been confirmed.

use crate::error::ApiError;
use crate::models::AppointmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppointmentEvent {
    Confirm,
    Cancel,
    CheckIn,
}

impl AppointmentEvent {
    pub const ALL: [AppointmentEvent; 3] = [
        AppointmentEvent::Confirm,
        AppointmentEvent::Cancel,
        AppointmentEvent::CheckIn,
    ];

    /// The doctor decision matching a requested status, if it is one.
    pub fn decision(requested: AppointmentStatus) -> Option<Self> {
        match requested {
            AppointmentStatus::Confirmed => Some(AppointmentEvent::Confirm),
            AppointmentStatus::Cancelled => Some(AppointmentEvent::Cancel),
            _ => None,
        }
    }

    pub fn target(self) -> AppointmentStatus {
        match self {
            AppointmentEvent::Confirm => AppointmentStatus::Confirmed,
            AppointmentEvent::Cancel => AppointmentStatus::Cancelled,
            AppointmentEvent::CheckIn => AppointmentStatus::Completed,
        }
    }

    /// Statuses the event may fire from. Also used as the expected set of
    /// the conditional write, so the check and the write agree.
    pub fn sources(self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentEvent::Confirm | AppointmentEvent::Cancel => &[AppointmentStatus::Pending],
            AppointmentEvent::CheckIn => {
                &[AppointmentStatus::Pending, AppointmentStatus::Confirmed]
            }
        }
    }
}

pub fn can_transition(from: AppointmentStatus, event: AppointmentEvent) -> bool {
    event.sources().contains(&from)
}

/// Next status, or a conflict naming the current one.
pub fn transition(
    from: AppointmentStatus,
    event: AppointmentEvent,
) -> Result<AppointmentStatus, ApiError> {
    if can_transition(from, event) {
        tracing::debug!(%from, to = %event.target(), ?event, "valid appointment transition");
        Ok(event.target())
    } else {
        tracing::warn!(%from, ?event, allowed = ?possible_events(from), "rejected appointment transition");
        Err(ApiError::conflict(format!("Appointment is already {from}")))
    }
}

pub fn possible_events(from: AppointmentStatus) -> Vec<AppointmentEvent> {
    AppointmentEvent::ALL
        .into_iter()
        .filter(|e| can_transition(from, *e))
        .collect()
}
