// src/tokens.rs
//
// Appointment check-in and review tokens.

use chrono::NaiveDate;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Check-in token for a confirmed appointment: SHA-256 hex over
/// `"{id}-{date}-{time}"`. Deterministic, so re-confirming yields the same value.
pub fn verification_token(appointment_id: Uuid, date: NaiveDate, time: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{appointment_id}-{date}-{time}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Single-use review link token (32 random bytes, hex).
pub fn generate_review_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// What the confirmation QR code encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub appointment_id: Uuid,
    pub verification_token: String,
}

impl QrPayload {
    pub fn to_json(&self) -> String {
        // a struct of a Uuid and a String always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}
