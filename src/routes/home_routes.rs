use axum::{Json, Router, extract::State, routing::get};
use axum_extra::extract::cookie::SignedCookieJar;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::flash;
use crate::models::{AppState, View};

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct DashboardCounts {
    pub patients: i64,
    pub scheduled_appointments: i64,
    pub pending_prescriptions: i64,
    pub pending_bills: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct HomeData {
    pub title: &'static str,
    pub counts: DashboardCounts,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(home))
}

pub async fn dashboard_counts(db: &SqlitePool) -> Result<DashboardCounts, ApiError> {
    let counts = sqlx::query_as::<_, DashboardCounts>(
        r#"
        SELECT
          (SELECT COUNT(*) FROM patients) AS patients,
          (SELECT COUNT(*) FROM appointments WHERE status = 'scheduled') AS scheduled_appointments,
          (SELECT COUNT(*) FROM prescriptions WHERE status = 'pending') AS pending_prescriptions,
          (SELECT COUNT(*) FROM bills WHERE status = 'pending') AS pending_bills
        "#,
    )
    .fetch_one(db)
    .await?;
    Ok(counts)
}

pub async fn home(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<View<HomeData>>), ApiError> {
    let counts = dashboard_counts(&state.db).await?;
    let (jar, flash) = flash::take(jar);

    Ok((
        jar,
        Json(View {
            data: HomeData {
                title: "Hospital Management System",
                counts,
            },
            flash,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use crate::routes::patient_routes::register_patient;
    use crate::routes::test_support::{body_json, get_request, patient_form, test_app};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn landing_page_reports_counts() {
        let (app, state) = test_app().await;
        register_patient(&state.db, &patient_form("Ada", "Lovelace")).await.unwrap();

        let res = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["data"]["counts"]["patients"], 1);
        assert_eq!(body["data"]["counts"]["pending_bills"], 0);
    }
}
