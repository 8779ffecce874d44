use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod doctor_routes;
pub mod patient_routes;
pub mod review_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api/doctors", doctor_routes::router())
        .nest("/api/book", appointment_routes::router())
        .nest("/api/patient", patient_routes::router())
        .nest("/api/review", review_routes::router())
        .with_state(state)
}
