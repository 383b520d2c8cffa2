// src/routes/doctor_routes.rs

use axum::{extract::State, routing::get, Json, Router};
use axum_extra::extract::cookie::SignedCookieJar;
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    flash,
    models::{AppState, DoctorRow, View},
};

// Doctors are seed data only; there is no create/update route.
pub fn router() -> Router<AppState> {
    Router::new().route("/doctors", get(doctors_page))
}

pub async fn list_doctors(db: &SqlitePool) -> Result<Vec<DoctorRow>, ApiError> {
    let rows = sqlx::query_as::<_, DoctorRow>(
        r#"
        SELECT id, name, specialty, phone, email
        FROM doctors
        ORDER BY name ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn doctors_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<Vec<DoctorRow>>>), ApiError> {
    let data = list_doctors(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((jar, Json(View { data, flash })))
}
