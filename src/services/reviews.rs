// src/services/reviews.rs
//
// Token-gated review flow. The token is the only credential.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{AppState, ReviewRow};
use crate::store::ReviewSubmission;

pub const MAX_COMMENT_LEN: usize = 500;

const INVALID_LINK: &str = "Invalid or expired review link";

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewDetails {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmittedReview {
    pub review: ReviewRow,
    pub doctor_average_rating: f64,
    pub doctor_rating_count: i64,
}

pub fn validate_submission(req: &SubmitReviewRequest) -> Result<ReviewSubmission, ApiError> {
    let rating = match req.rating {
        Some(r @ 1..=5) => r as i16,
        _ => {
            return Err(ApiError::validation(
                "Invalid rating. Please provide a value between 1 and 5.",
            ));
        }
    };

    let comment = req.comment.as_deref().unwrap_or_default().trim().to_string();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::validation(format!(
            "Comment cannot exceed {MAX_COMMENT_LEN} characters"
        )));
    }

    Ok(ReviewSubmission {
        rating,
        comment,
        is_anonymous: req.is_anonymous,
    })
}

pub async fn review_details(state: &AppState, review_token: &str) -> Result<ReviewDetails, ApiError> {
    let review = state
        .store
        .find_pending_review(review_token)
        .await?
        .ok_or_else(|| ApiError::validation(INVALID_LINK))?;

    let doctor = state
        .store
        .doctor_profile(review.doctor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;

    Ok(ReviewDetails {
        appointment_id: review.appointment_id,
        doctor_id: review.doctor_id,
        doctor_name: doctor.full_name(),
        specialization: doctor.doctor.specialization,
    })
}

/// At most once per token: the claim and the rating update happen together
/// in the store, so a replayed or concurrent submit sees an invalid link.
/// The link is checked before the body, so a dead link always reports as one.
pub async fn submit_review(
    state: &AppState,
    review_token: &str,
    req: &SubmitReviewRequest,
) -> Result<SubmittedReview, ApiError> {
    if state.store.find_pending_review(review_token).await?.is_none() {
        return Err(ApiError::validation(INVALID_LINK));
    }
    let submission = validate_submission(req)?;

    let (review, doctor) = state
        .store
        .submit_review(review_token, submission)
        .await?
        .ok_or_else(|| ApiError::validation(INVALID_LINK))?;

    tracing::info!(
        review_id = %review.review_id,
        doctor_id = %doctor.doctor_id,
        rating = review.rating,
        average = doctor.average_rating,
        "review submitted"
    );

    Ok(SubmittedReview {
        review,
        doctor_average_rating: doctor.average_rating,
        doctor_rating_count: doctor.rating_count,
    })
}
