// src/routes/review_routes.rs
//
// No session required: the review token in the path is the credential.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch},
};

use crate::{
    error::ApiError,
    models::{ApiOk, AppState},
    services::reviews::{self, ReviewDetails, SubmitReviewRequest, SubmittedReview},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/details/{review_token}", get(review_details))
        .route("/submit/{review_token}", patch(submit_review))
}

pub async fn review_details(
    State(state): State<AppState>,
    Path(review_token): Path<String>,
) -> Result<Json<ApiOk<ReviewDetails>>, ApiError> {
    Ok(Json(ApiOk {
        data: reviews::review_details(&state, &review_token).await?,
    }))
}

pub async fn submit_review(
    State(state): State<AppState>,
    Path(review_token): Path<String>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<Json<ApiOk<SubmittedReview>>, ApiError> {
    Ok(Json(ApiOk {
        data: reviews::submit_review(&state, &review_token, &req).await?,
    }))
}
