// src/routes/pharmacy_routes.rs

use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    flash::{self, Flash},
    models::{parse_id, required, AppState, DoctorRow, MedicationRow, PatientRow, PrescriptionStatus, View},
    routes::{doctor_routes, patient_routes},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pharmacy", get(pharmacy_page))
        .route("/medications", get(medications_page))
        .route(
            "/create_prescription",
            get(create_prescription_page).post(create_prescription_submit),
        )
        .route("/update_prescription/{prescription_id}/{status}", get(update_prescription_status_handler))
}

/* ============================================================
   Rows
   ============================================================ */

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PrescriptionRow {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub medication_id: i64,
    pub quantity: i64,
    pub dosage: String,
    pub duration: String,
    pub prescription_date: NaiveDate,
    /// Fixed at creation from the price of the day.
    pub total_amount_cents: i64,
    pub status: PrescriptionStatus,
    pub patient_name: String,
    pub doctor_name: String,
    pub medication_name: String,
    /// Current catalogue price, for display.
    pub price_cents: i64,
}

const PRESCRIPTION_SELECT: &str = r#"
    SELECT
      rx.id,
      rx.patient_id,
      rx.doctor_id,
      rx.medication_id,
      rx.quantity,
      rx.dosage,
      rx.duration,
      rx.prescription_date,
      rx.total_amount_cents,
      rx.status,
      p.first_name || ' ' || p.last_name AS patient_name,
      d.name AS doctor_name,
      m.name AS medication_name,
      m.price_cents
    FROM prescriptions rx
    JOIN patients p ON p.id = rx.patient_id
    JOIN doctors d ON d.id = rx.doctor_id
    JOIN medications m ON m.id = rx.medication_id
"#;

const PRESCRIPTION_ORDER: &str = "ORDER BY rx.prescription_date DESC, rx.id DESC";

/* ============================================================
   Store operations
   ============================================================ */

pub async fn list_prescriptions(db: &SqlitePool) -> Result<Vec<PrescriptionRow>, ApiError> {
    let rows = sqlx::query_as::<_, PrescriptionRow>(&format!("{PRESCRIPTION_SELECT} {PRESCRIPTION_ORDER}"))
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn list_prescriptions_for_patient(
    db: &SqlitePool,
    patient_id: i64,
) -> Result<Vec<PrescriptionRow>, ApiError> {
    let rows = sqlx::query_as::<_, PrescriptionRow>(&format!(
        "{PRESCRIPTION_SELECT} WHERE rx.patient_id = ? {PRESCRIPTION_ORDER}"
    ))
    .bind(patient_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_medications(db: &SqlitePool) -> Result<Vec<MedicationRow>, ApiError> {
    let rows = sqlx::query_as::<_, MedicationRow>(
        r#"
        SELECT id, name, price_cents, stock, description, category
        FROM medications
        ORDER BY name ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePrescriptionForm {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub medication_id: Option<String>,
    pub quantity: Option<String>,
    pub dosage: Option<String>,
    pub duration: Option<String>,
}

/// Prices the prescription from the medication catalogue and inserts it as pending.
/// Lookup and insert share a transaction so the total matches the price read.
/// Stock is not decremented.
pub async fn create_prescription(db: &SqlitePool, form: &CreatePrescriptionForm) -> Result<i64, ApiError> {
    let patient_id = parse_id(&form.patient_id, "patient_id")?;
    let doctor_id = parse_id(&form.doctor_id, "doctor_id")?;
    let medication_id = parse_id(&form.medication_id, "medication_id")?;
    let quantity: i64 = required(&form.quantity, "quantity")?
        .parse()
        .map_err(|_| ApiError::validation("quantity must be a whole number"))?;
    if quantity <= 0 {
        return Err(ApiError::validation("quantity must be > 0"));
    }
    let dosage = required(&form.dosage, "dosage")?;
    let duration = required(&form.duration, "duration")?;

    let mut tx = db.begin().await?;

    let price_cents: i64 = sqlx::query_scalar("SELECT price_cents FROM medications WHERE id = ?")
        .bind(medication_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound("medication"))?;

    let total_amount_cents = price_cents
        .checked_mul(quantity)
        .ok_or_else(|| ApiError::validation("quantity is too large"))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO prescriptions (patient_id, doctor_id, medication_id, quantity, dosage, duration,
                                   prescription_date, total_amount_cents, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(medication_id)
    .bind(quantity)
    .bind(dosage)
    .bind(duration)
    .bind(Utc::now().date_naive())
    .bind(total_amount_cents)
    .bind(PrescriptionStatus::Pending)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}

pub async fn update_prescription_status(
    db: &SqlitePool,
    prescription_id: i64,
    status: PrescriptionStatus,
) -> Result<(), ApiError> {
    let res = sqlx::query("UPDATE prescriptions SET status = ? WHERE id = ?")
        .bind(status)
        .bind(prescription_id)
        .execute(db)
        .await?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("prescription"));
    }
    Ok(())
}

/* ============================================================
   Handlers
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PharmacyData {
    pub prescriptions: Vec<PrescriptionRow>,
    pub medications: Vec<MedicationRow>,
}

pub async fn pharmacy_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<PharmacyData>>), ApiError> {
    let prescriptions = list_prescriptions(&state.db).await?;
    let medications = list_medications(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        Json(View {
            data: PharmacyData {
                prescriptions,
                medications,
            },
            flash,
        }),
    ))
}

pub async fn medications_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<Vec<MedicationRow>>>), ApiError> {
    let data = list_medications(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((jar, Json(View { data, flash })))
}

#[derive(Debug, Serialize)]
pub struct CreatePrescriptionFormData {
    pub patients: Vec<PatientRow>,
    pub doctors: Vec<DoctorRow>,
    pub medications: Vec<MedicationRow>,
}

pub async fn create_prescription_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<CreatePrescriptionFormData>>), ApiError> {
    let patients = patient_routes::list_patients_by_name(&state.db).await?;
    let doctors = doctor_routes::list_doctors(&state.db).await?;
    let medications = list_medications(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        Json(View {
            data: CreatePrescriptionFormData {
                patients,
                doctors,
                medications,
            },
            flash,
        }),
    ))
}

pub async fn create_prescription_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CreatePrescriptionForm>,
) -> (SignedCookieJar, Redirect) {
    match create_prescription(&state.db, &form).await {
        Ok(prescription_id) => {
            tracing::info!(prescription_id, "prescription created");
            flash::redirect(jar, "/pharmacy", Flash::success("Prescription created successfully!"))
        }
        Err(e) => {
            tracing::warn!("creating prescription failed: {e}");
            flash::redirect(
                jar,
                "/create_prescription",
                Flash::error(format!("Error creating prescription: {e}")),
            )
        }
    }
}

pub async fn update_prescription_status_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((prescription_id, status)): Path<(i64, String)>,
) -> (SignedCookieJar, Redirect) {
    let res = match status.parse::<PrescriptionStatus>() {
        Ok(status) => update_prescription_status(&state.db, prescription_id, status)
            .await
            .map(|_| status),
        Err(e) => Err(e),
    };

    match res {
        Ok(status) => {
            tracing::info!(prescription_id, %status, "prescription status updated");
            flash::redirect(jar, "/pharmacy", Flash::success(format!("Prescription {status} successfully!")))
        }
        Err(e) => {
            tracing::warn!(prescription_id, "updating prescription failed: {e}");
            flash::redirect(jar, "/pharmacy", Flash::error(format!("Error updating prescription: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::routes::patient_routes::register_patient;
    use crate::routes::test_support::{body_json, form_request, get_request, patient_form, test_app};
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    fn form(patient_id: i64, medication_id: i64, quantity: &str) -> CreatePrescriptionForm {
        CreatePrescriptionForm {
            patient_id: Some(patient_id.to_string()),
            doctor_id: Some("1".into()),
            medication_id: Some(medication_id.to_string()),
            quantity: Some(quantity.into()),
            dosage: Some("1 tablet twice daily".into()),
            duration: Some("7 days".into()),
        }
    }

    async fn aspirin_id(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT id FROM medications WHERE name = 'Aspirin'")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn total_is_price_times_quantity() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        let aspirin = aspirin_id(&db).await;

        let id = create_prescription(&db, &form(pid, aspirin, "4")).await.unwrap();

        let rx = list_prescriptions(&db).await.unwrap().remove(0);
        assert_eq!(rx.id, id);
        assert_eq!(rx.total_amount_cents, 5196);
        assert_eq!(rx.status, PrescriptionStatus::Pending);
        assert_eq!(rx.medication_name, "Aspirin");
        assert_eq!(rx.prescription_date, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn total_is_not_recomputed_after_price_change() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        let aspirin = aspirin_id(&db).await;
        create_prescription(&db, &form(pid, aspirin, "4")).await.unwrap();

        sqlx::query("UPDATE medications SET price_cents = 9999 WHERE id = ?")
            .bind(aspirin)
            .execute(&db)
            .await
            .unwrap();

        let rx = list_prescriptions(&db).await.unwrap().remove(0);
        assert_eq!(rx.total_amount_cents, 5196);
        assert_eq!(rx.price_cents, 9999);
    }

    #[tokio::test]
    async fn stock_is_left_alone() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        let aspirin = aspirin_id(&db).await;
        create_prescription(&db, &form(pid, aspirin, "30")).await.unwrap();

        let stock: i64 = sqlx::query_scalar("SELECT stock FROM medications WHERE id = ?")
            .bind(aspirin)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(stock, 500);
    }

    #[tokio::test]
    async fn unknown_medication_is_not_found() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        let err = create_prescription(&db, &form(pid, 777, "1")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("medication")));
        assert!(list_prescriptions(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_patient_or_doctor_is_a_store_error() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();

        let err = create_prescription(&db, &form(pid + 100, 1, "1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Store(_)));

        let mut bad_doctor = form(pid, 1, "1");
        bad_doctor.doctor_id = Some("99".into());
        let err = create_prescription(&db, &bad_doctor).await.unwrap_err();
        assert!(matches!(err, ApiError::Store(_)));

        assert!(list_prescriptions(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        for q in ["0", "-3", "two"] {
            let err = create_prescription(&db, &form(pid, 1, q)).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "quantity {q}");
        }
    }

    #[tokio::test]
    async fn status_update_overwrites() {
        let db = test_pool().await;
        let pid = register_patient(&db, &patient_form("Ada", "Lovelace")).await.unwrap();
        let id = create_prescription(&db, &form(pid, 1, "2")).await.unwrap();

        update_prescription_status(&db, id, PrescriptionStatus::Filled).await.unwrap();
        assert_eq!(list_prescriptions(&db).await.unwrap()[0].status, PrescriptionStatus::Filled);

        update_prescription_status(&db, id, PrescriptionStatus::Pending).await.unwrap();
        assert_eq!(list_prescriptions(&db).await.unwrap()[0].status, PrescriptionStatus::Pending);

        let err = update_prescription_status(&db, 404, PrescriptionStatus::Filled).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("prescription")));
    }

    #[tokio::test]
    async fn medications_are_ordered_by_name() {
        let db = test_pool().await;
        let names: Vec<String> = list_medications(&db).await.unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Amoxicillin", "Aspirin", "Ibuprofen", "Lisinopril", "Metformin"]);
    }

    #[tokio::test]
    async fn submit_and_fill_through_routes() {
        let (app, state) = test_app().await;
        let pid = register_patient(&state.db, &patient_form("Ada", "Lovelace")).await.unwrap();

        let res = app
            .clone()
            .oneshot(form_request(
                "/create_prescription",
                &format!("patient_id={pid}&doctor_id=2&medication_id=2&quantity=3&dosage=500mg&duration=10+days"),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/pharmacy");

        let rx = list_prescriptions(&state.db).await.unwrap().remove(0);
        assert_eq!(rx.total_amount_cents, 7650);
        assert_eq!(rx.duration, "10 days");

        let res = app
            .clone()
            .oneshot(get_request(&format!("/update_prescription/{}/filled", rx.id)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let res = app.oneshot(get_request("/pharmacy")).await.unwrap();
        let body = body_json(res).await;
        assert_eq!(body["data"]["prescriptions"][0]["status"], "filled");
        assert_eq!(body["data"]["medications"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_submit_returns_to_form() {
        let (app, _) = test_app().await;
        let res = app
            .oneshot(form_request("/create_prescription", "patient_id=1&medication_id=1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/create_prescription");
    }
}
