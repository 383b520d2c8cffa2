// src/routes/patient_routes.rs

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    flash::{self, Flash},
    models::{optional, parse_date, required, AppState, PatientRow, View},
    routes::{
        appointment_routes::{self, AppointmentRow},
        billing_routes::{self, BillRow},
        pharmacy_routes::{self, PrescriptionRow},
    },
};

pub const GENDERS: &[&str] = &["male", "female", "other"];
pub const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
const SEARCH_LIMIT: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(patients_page))
        .route("/patient/{patient_id}", get(patient_detail_page))
        .route(
            "/register_patient",
            get(register_patient_page).post(register_patient_submit),
        )
        .route("/api/patient_search", get(patient_search))
}

const PATIENT_COLUMNS: &str = r#"
    id, first_name, last_name, date_of_birth, gender, phone, email, address,
    emergency_contact, medical_history, allergies, blood_type, insurance_number, registered_at
"#;

/* ============================================================
   Store operations
   ============================================================ */

#[derive(Debug, Default, Deserialize)]
pub struct RegisterPatientForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub blood_type: Option<String>,
    pub insurance_number: Option<String>,
}

pub async fn list_patients(db: &SqlitePool) -> Result<Vec<PatientRow>, ApiError> {
    let rows = sqlx::query_as::<_, PatientRow>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY registered_at DESC, id DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Patients for select inputs on the scheduling/prescription/billing forms.
pub async fn list_patients_by_name(db: &SqlitePool) -> Result<Vec<PatientRow>, ApiError> {
    let rows = sqlx::query_as::<_, PatientRow>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY first_name, last_name"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn register_patient(db: &SqlitePool, form: &RegisterPatientForm) -> Result<i64, ApiError> {
    let first_name = required(&form.first_name, "first_name")?;
    let last_name = required(&form.last_name, "last_name")?;
    let date_of_birth = parse_date(&form.date_of_birth, "date_of_birth")?;
    let gender = required(&form.gender, "gender")?.to_ascii_lowercase();
    let phone = required(&form.phone, "phone")?;
    let email = required(&form.email, "email")?;

    if !GENDERS.contains(&gender.as_str()) {
        return Err(ApiError::validation(format!(
            "gender must be one of {}",
            GENDERS.join(", ")
        )));
    }
    let blood_type = optional(&form.blood_type).map(|b| b.to_ascii_uppercase());
    if let Some(b) = blood_type.as_deref() {
        if !BLOOD_TYPES.contains(&b) {
            return Err(ApiError::validation(format!(
                "blood_type must be one of {}",
                BLOOD_TYPES.join(", ")
            )));
        }
    }
    if date_of_birth > Utc::now().date_naive() {
        return Err(ApiError::validation("date_of_birth cannot be in the future"));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO patients (first_name, last_name, date_of_birth, gender, phone, email,
                              address, emergency_contact, medical_history, allergies,
                              blood_type, insurance_number, registered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(first_name)
    .bind(last_name)
    .bind(date_of_birth)
    .bind(gender)
    .bind(phone)
    .bind(email)
    .bind(optional(&form.address))
    .bind(optional(&form.emergency_contact))
    .bind(optional(&form.medical_history))
    .bind(optional(&form.allergies))
    .bind(blood_type)
    .bind(optional(&form.insurance_number))
    .bind(Utc::now())
    .fetch_one(db)
    .await?;

    Ok(id)
}

pub async fn get_patient(db: &SqlitePool, patient_id: i64) -> Result<PatientRow, ApiError> {
    sqlx::query_as::<_, PatientRow>(&format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"))
        .bind(patient_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("patient"))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct PatientSearchHit {
    pub id: i64,
    pub name: String,
}

/// Substring match on first or last name (ASCII case-insensitive, SQLite LIKE).
pub async fn search_patients(db: &SqlitePool, query: &str) -> Result<Vec<PatientSearchHit>, ApiError> {
    let like = format!("%{}%", escape_like(query.trim()));

    let rows = sqlx::query_as::<_, PatientSearchHit>(
        r#"
        SELECT id, first_name || ' ' || last_name AS name
        FROM patients
        WHERE first_name LIKE ? ESCAPE '\'
           OR last_name LIKE ? ESCAPE '\'
        ORDER BY last_name, first_name
        LIMIT ?
        "#,
    )
    .bind(&like)
    .bind(&like)
    .bind(SEARCH_LIMIT)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn patients_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<Vec<PatientRow>>>), ApiError> {
    let data = list_patients(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((jar, Json(View { data, flash })))
}

#[derive(Debug, Serialize)]
pub struct PatientDetail {
    pub patient: PatientRow,
    pub appointments: Vec<AppointmentRow>,
    pub prescriptions: Vec<PrescriptionRow>,
    pub bills: Vec<BillRow>,
}

async fn load_patient_detail(db: &SqlitePool, patient_id: i64) -> Result<PatientDetail, ApiError> {
    let patient = get_patient(db, patient_id).await?;
    let appointments = appointment_routes::list_appointments_for_patient(db, patient_id).await?;
    let prescriptions = pharmacy_routes::list_prescriptions_for_patient(db, patient_id).await?;
    let bills = billing_routes::list_bills_for_patient(db, patient_id).await?;

    Ok(PatientDetail {
        patient,
        appointments,
        prescriptions,
        bills,
    })
}

pub async fn patient_detail_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(patient_id): Path<i64>,
) -> Response {
    match load_patient_detail(&state.db, patient_id).await {
        Ok(data) => {
            let (jar, flash) = flash::take(jar);
            (jar, Json(View { data, flash })).into_response()
        }
        Err(ApiError::NotFound(_)) => {
            flash::redirect(jar, "/patients", Flash::error("Patient not found!")).into_response()
        }
        Err(e) => {
            tracing::warn!(patient_id, "loading patient failed: {e}");
            flash::redirect(jar, "/patients", Flash::error(format!("Error loading patient: {e}")))
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterPatientFormData {
    pub genders: &'static [&'static str],
    pub blood_types: &'static [&'static str],
}

pub async fn register_patient_page(
    jar: SignedCookieJar,
) -> (SignedCookieJar, Json<View<RegisterPatientFormData>>) {
    let (jar, flash) = flash::take(jar);
    (
        jar,
        Json(View {
            data: RegisterPatientFormData {
                genders: GENDERS,
                blood_types: BLOOD_TYPES,
            },
            flash,
        }),
    )
}

pub async fn register_patient_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<RegisterPatientForm>,
) -> (SignedCookieJar, Redirect) {
    match register_patient(&state.db, &form).await {
        Ok(patient_id) => {
            tracing::info!(patient_id, "patient registered");
            flash::redirect(jar, "/patients", Flash::success("Patient registered successfully!"))
        }
        Err(e) => {
            tracing::warn!("patient registration failed: {e}");
            flash::redirect(
                jar,
                "/register_patient",
                Flash::error(format!("Error registering patient: {e}")),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn patient_search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<PatientSearchHit>>, ApiError> {
    let rows = search_patients(&state.db, q.q.as_deref().unwrap_or_default()).await?;
    Ok(Json(rows))
}
