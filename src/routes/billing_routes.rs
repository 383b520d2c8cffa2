// src/routes/billing_routes.rs

use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    flash::{self, Flash},
    models::{parse_cents, parse_date, parse_id, required, AppState, BillStatus, PatientRow, View},
    routes::patient_routes,
};

/// Bills fall due this many calendar days after the bill date.
pub const PAYMENT_TERM_DAYS: u64 = 30;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing", get(billing_page))
        .route("/create_bill", get(create_bill_page).post(create_bill_submit))
        .route("/update_bill/{bill_id}/{status}", get(update_bill_status_handler))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BillRow {
    pub id: i64,
    pub patient_id: i64,
    pub description: String,
    pub amount_cents: i64,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub patient_name: String,
}

const BILL_SELECT: &str = r#"
    SELECT
      b.id,
      b.patient_id,
      b.description,
      b.amount_cents,
      b.bill_date,
      b.due_date,
      b.status,
      p.first_name || ' ' || p.last_name AS patient_name
    FROM bills b
    JOIN patients p ON p.id = b.patient_id
"#;

const BILL_ORDER: &str = "ORDER BY b.bill_date DESC, b.id DESC";

pub async fn list_bills(db: &SqlitePool) -> Result<Vec<BillRow>, ApiError> {
    let rows = sqlx::query_as::<_, BillRow>(&format!("{BILL_SELECT} {BILL_ORDER}"))
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn list_bills_for_patient(db: &SqlitePool, patient_id: i64) -> Result<Vec<BillRow>, ApiError> {
    let rows = sqlx::query_as::<_, BillRow>(&format!("{BILL_SELECT} WHERE b.patient_id = ? {BILL_ORDER}"))
        .bind(patient_id)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub fn due_date_for(bill_date: NaiveDate) -> Result<NaiveDate, ApiError> {
    bill_date
        .checked_add_days(Days::new(PAYMENT_TERM_DAYS))
        .ok_or_else(|| ApiError::validation("bill_date is out of range"))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBillForm {
    pub patient_id: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub bill_date: Option<String>,
}

pub async fn create_bill(db: &SqlitePool, form: &CreateBillForm) -> Result<i64, ApiError> {
    let patient_id = parse_id(&form.patient_id, "patient_id")?;
    let description = required(&form.description, "description")?;
    let amount_cents = parse_cents(&form.amount, "amount")?;
    let bill_date = parse_date(&form.bill_date, "bill_date")?;
    let due_date = due_date_for(bill_date)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bills (patient_id, description, amount_cents, bill_date, due_date, status)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(patient_id)
    .bind(description)
    .bind(amount_cents)
    .bind(bill_date)
    .bind(due_date)
    .bind(BillStatus::Pending)
    .fetch_one(db)
    .await?;

    Ok(id)
}

pub async fn update_bill_status(db: &SqlitePool, bill_id: i64, status: BillStatus) -> Result<(), ApiError> {
    let res = sqlx::query("UPDATE bills SET status = ? WHERE id = ?")
        .bind(status)
        .bind(bill_id)
        .execute(db)
        .await?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("bill"));
    }
    Ok(())
}

pub async fn billing_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<Vec<BillRow>>>), ApiError> {
    let data = list_bills(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((jar, Json(View { data, flash })))
}

#[derive(Debug, Serialize)]
pub struct CreateBillFormData {
    pub patients: Vec<PatientRow>,
}

pub async fn create_bill_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<CreateBillFormData>>), ApiError> {
    let patients = patient_routes::list_patients_by_name(&state.db).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        Json(View {
            data: CreateBillFormData { patients },
            flash,
        }),
    ))
}

pub async fn create_bill_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CreateBillForm>,
) -> (SignedCookieJar, Redirect) {
    match create_bill(&state.db, &form).await {
        Ok(bill_id) => {
            tracing::info!(bill_id, "bill created");
            flash::redirect(jar, "/billing", Flash::success("Bill created successfully!"))
        }
        Err(e) => {
            tracing::warn!("creating bill failed: {e}");
            flash::redirect(jar, "/create_bill", Flash::error(format!("Error creating bill: {e}")))
        }
    }
}

pub async fn update_bill_status_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((bill_id, status)): Path<(i64, String)>,
) -> (SignedCookieJar, Redirect) {
    let res = match status.parse::<BillStatus>() {
        Ok(status) => update_bill_status(&state.db, bill_id, status).await.map(|_| status),
        Err(e) => Err(e),
    };

    match res {
        Ok(status) => {
            tracing::info!(bill_id, %status, "bill status updated");
            flash::redirect(jar, "/billing", Flash::success(format!("Bill marked as {status} successfully!")))
        }
        Err(e) => {
            tracing::warn!(bill_id, "updating bill failed: {e}");
            flash::redirect(jar, "/billing", Flash::error(format!("Error updating bill: {e}")))
        }
    }
}
