//! Appointment workflow and the read paths around it. Route handlers do
//! extraction and role checks, then call in here.

pub mod appointments;
pub mod lifecycle;
pub mod listing;
pub mod notifier;
pub mod reviews;
pub mod templates;
