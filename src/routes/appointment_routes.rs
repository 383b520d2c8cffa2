// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    flash::{self, Flash},
    models::{optional, parse_date, parse_id, required, AppState, AppointmentStatus, DoctorRow, PatientRow, View},
    routes::{doctor_routes, patient_routes},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(appointments_page))
        .route(
            "/schedule_appointment",
            get(schedule_appointment_page).post(schedule_appointment_submit),
        )
        .route("/update_appointment/{appointment_id}/{status}", get(update_appointment_status_handler))
}

/* ============================================================
   Rows
   ============================================================ */

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub reason: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub patient_name: String,
    pub doctor_name: String,
    pub specialty: String,
}

const APPOINTMENT_SELECT: &str = r#"
    SELECT
      a.id,
      a.patient_id,
      a.doctor_id,
      a.appointment_date,
      a.appointment_time,
      a.reason,
      a.status,
      a.notes,
      p.first_name || ' ' || p.last_name AS patient_name,
      d.name AS doctor_name,
      d.specialty
    FROM appointments a
    JOIN patients p ON p.id = a.patient_id
    JOIN doctors d ON d.id = a.doctor_id
"#;

// Times are stored normalised as HH:MM:SS, so text order is chronological.
const APPOINTMENT_ORDER: &str = "ORDER BY a.appointment_date DESC, a.appointment_time DESC, a.id DESC";

/* ============================================================
   Store operations
   ============================================================ */

pub async fn list_appointments(db: &SqlitePool) -> Result<Vec<AppointmentRow>, ApiError> {
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!("{APPOINTMENT_SELECT} {APPOINTMENT_ORDER}"))
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn list_appointments_for_patient(
    db: &SqlitePool,
    patient_id: i64,
) -> Result<Vec<AppointmentRow>, ApiError> {
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        "{APPOINTMENT_SELECT} WHERE a.patient_id = ? {APPOINTMENT_ORDER}"
    ))
    .bind(patient_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleAppointmentForm {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

fn parse_time(value: &Option<String>, field: &str) -> Result<NaiveTime, ApiError> {
    let raw = required(value, field)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(|_| ApiError::validation(format!("{field} must be HH:MM")))
}

/// No overlap check: the same doctor may be booked twice for one slot.
pub async fn schedule_appointment(db: &SqlitePool, form: &ScheduleAppointmentForm) -> Result<i64, ApiError> {
    let patient_id = parse_id(&form.patient_id, "patient_id")?;
    let doctor_id = parse_id(&form.doctor_id, "doctor_id")?;
    let date = parse_date(&form.appointment_date, "appointment_date")?;
    let time = parse_time(&form.appointment_time, "appointment_time")?;
    let reason = required(&form.reason, "reason")?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO appointments (patient_id, doctor_id, appointment_date, appointment_time, reason, status, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(date)
    .bind(time.format("%H:%M:%S").to_string())
    .bind(reason)
    .bind(AppointmentStatus::Scheduled)
    .bind(optional(&form.notes))
    .fetch_one(db)
    .await?;

    Ok(id)
}

/// Overwrites the status unconditionally; only the value set is closed.
pub async fn update_appointment_status(
    db: &SqlitePool,
    appointment_id: i64,
    status: AppointmentStatus,
) -> Result<(), ApiError> {
    let res = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(status)
        .bind(appointment_id)
        .execute(db)
        .await?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("appointment"));
    }
    Ok(())
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn appointments_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<Vec<AppointmentRow>>>), ApiError> {
    let data = list_appointments(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((jar, Json(View { data, flash })))
}

#[derive(Debug, Serialize)]
pub struct ScheduleAppointmentFormData {
    pub patients: Vec<PatientRow>,
    pub doctors: Vec<DoctorRow>,
}

pub async fn schedule_appointment_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<ScheduleAppointmentFormData>>), ApiError> {
    let patients = patient_routes::list_patients_by_name(&state.db).await?;
    let doctors = doctor_routes::list_doctors(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        Json(View {
            data: ScheduleAppointmentFormData { patients, doctors },
            flash,
        }),
    ))
}

pub async fn schedule_appointment_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<ScheduleAppointmentForm>,
) -> (SignedCookieJar, Redirect) {
    match schedule_appointment(&state.db, &form).await {
        Ok(appointment_id) => {
            tracing::info!(appointment_id, "appointment scheduled");
            flash::redirect(jar, "/appointments", Flash::success("Appointment scheduled successfully!"))
        }
        Err(e) => {
            tracing::warn!("scheduling appointment failed: {e}");
            flash::redirect(
                jar,
                "/schedule_appointment",
                Flash::error(format!("Error scheduling appointment: {e}")),
            )
        }
    }
}

pub async fn update_appointment_status_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((appointment_id, status)): Path<(i64, String)>,
) -> (SignedCookieJar, Redirect) {
    let res = match status.parse::<AppointmentStatus>() {
        Ok(status) => update_appointment_status(&state.db, appointment_id, status)
            .await
            .map(|_| status),
        Err(e) => Err(e),
    };

    match res {
        Ok(status) => {
            tracing::info!(appointment_id, %status, "appointment status updated");
            flash::redirect(jar, "/appointments", Flash::success(format!("Appointment {status} successfully!")))
        }
        Err(e) => {
            tracing::warn!(appointment_id, "updating appointment failed: {e}");
            flash::redirect(jar, "/appointments", Flash::error(format!("Error updating appointment: {e}")))
        }
    }
}
