use std::fmt;
use std::str::FromStr;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use sqlx::FromRow;

use crate::{config::Config, error::ApiError, flash::Flash};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub flash_key: Key,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, cfg: &Config) -> Self {
        let flash_key = match cfg.secret_key.as_deref() {
            // SHA-512 yields exactly the 64 bytes a cookie key needs.
            Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
            None => {
                tracing::warn!("SECRET_KEY not set; flash cookies will not survive a restart");
                Key::generate()
            }
        };
        Self { db, flash_key }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.flash_key.clone()
    }
}

/* -------------------------
   View envelope
--------------------------*/

/// Render input for every page: the page data plus the pending status message, if any.
#[derive(Debug, Serialize)]
pub struct View<T> {
    pub data: T,
    pub flash: Option<Flash>,
}

/* -------------------------
   Status enums
--------------------------*/

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $entity:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = "lowercase")]
        #[sqlx(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ApiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ApiError::validation(format!(
                        "unknown {} status '{other}' (expected one of: {})",
                        $entity,
                        $name::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(
    /// Any known status may overwrite any other; there is no terminal state.
    AppointmentStatus, "appointment" {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

status_enum!(
    PrescriptionStatus, "prescription" {
        Pending => "pending",
        Filled => "filled",
        Cancelled => "cancelled",
    }
);

status_enum!(
    BillStatus, "bill" {
        Pending => "pending",
        Paid => "paid",
        Overdue => "overdue",
    }
);

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub email: String,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub blood_type: Option<String>,
    pub insurance_number: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorRow {
    pub id: i64,
    pub name: String,
    pub specialty: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MedicationRow {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub description: Option<String>,
    pub category: Option<String>,
}

/* -------------------------
   Form field helpers
--------------------------*/

/// Trimmed value of a required field; absent or blank is a validation failure.
pub fn required(value: &Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

/// Trimmed value of an optional field; blank collapses to `None`.
pub fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn parse_id(value: &Option<String>, field: &str) -> Result<i64, ApiError> {
    required(value, field)?
        .parse::<i64>()
        .map_err(|_| ApiError::validation(format!("{field} must be a numeric id")))
}

pub fn parse_date(value: &Option<String>, field: &str) -> Result<NaiveDate, ApiError> {
    let raw = required(value, field)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("{field} must be YYYY-MM-DD")))
}

/// Parses a decimal money amount ("100", "12.5", "12.99") into integer cents.
pub fn parse_cents(value: &Option<String>, field: &str) -> Result<i64, ApiError> {
    let raw = required(value, field)?;
    let amount: f64 = raw
        .parse()
        .map_err(|_| ApiError::validation(format!("{field} must be a number")))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(ApiError::validation(format!("{field} must be >= 0")));
    }
    let cents = (amount * 100.0).round();
    if cents >= i64::MAX as f64 {
        return Err(ApiError::validation(format!("{field} is too large")));
    }
    Ok(cents as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_closed() {
        assert_eq!(
            "Cancelled".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Cancelled
        );
        assert_eq!("filled".parse::<PrescriptionStatus>().unwrap(), PrescriptionStatus::Filled);
        assert!("dispensed".parse::<PrescriptionStatus>().is_err());
        assert!("refunded".parse::<BillStatus>().is_err());
        assert_eq!(BillStatus::Overdue.to_string(), "overdue");
        assert_eq!(AppointmentStatus::ALL.len(), 3);
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let err = required(&Some("   ".into()), "first_name").unwrap_err();
        assert_eq!(err.to_string(), "first_name is required");
        assert!(required(&None, "email").is_err());
        assert_eq!(optional(&Some(" ".into())), None);
        assert_eq!(optional(&Some(" O+ ".into())), Some("O+".into()));
    }

    #[test]
    fn money_is_parsed_to_cents() {
        assert_eq!(parse_cents(&Some("100.0".into()), "amount").unwrap(), 10_000);
        assert_eq!(parse_cents(&Some("12.99".into()), "amount").unwrap(), 1_299);
        assert!(parse_cents(&Some("-1".into()), "amount").is_err());
        assert!(parse_cents(&Some("ten".into()), "amount").is_err());
        assert!(matches!(
            parse_cents(&Some("1e20".into()), "amount"),
            Err(ApiError::Validation(ref m)) if m == "amount is too large"
        ));
    }

    #[test]
    fn dates_must_be_calendar_dates() {
        assert_eq!(
            parse_date(&Some("2024-01-01".into()), "bill_date").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(parse_date(&Some("2024-02-30".into()), "bill_date").is_err());
        assert!(parse_date(&Some("01/01/2024".into()), "bill_date").is_err());
    }
}
