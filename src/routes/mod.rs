use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod billing_routes;
pub mod doctor_routes;
pub mod home_routes;
pub mod patient_routes;
pub mod pharmacy_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(home_routes::router())
        .merge(patient_routes::router())
        .merge(doctor_routes::router())
        .merge(appointment_routes::router())
        .merge(pharmacy_routes::router())
        .merge(billing_routes::router())
        .with_state(state)
}
