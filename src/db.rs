use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::config::Config;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS patients (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name        TEXT NOT NULL,
        last_name         TEXT NOT NULL,
        date_of_birth     TEXT NOT NULL,
        gender            TEXT NOT NULL,
        phone             TEXT NOT NULL,
        email             TEXT NOT NULL,
        address           TEXT,
        emergency_contact TEXT,
        medical_history   TEXT,
        allergies         TEXT,
        blood_type        TEXT,
        insurance_number  TEXT,
        registered_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doctors (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        name      TEXT NOT NULL,
        specialty TEXT NOT NULL,
        phone     TEXT NOT NULL,
        email     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appointments (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id       INTEGER NOT NULL REFERENCES patients (id),
        doctor_id        INTEGER NOT NULL REFERENCES doctors (id),
        appointment_date TEXT NOT NULL,
        appointment_time TEXT NOT NULL,
        reason           TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'scheduled'
                         CHECK (status IN ('scheduled', 'completed', 'cancelled')),
        notes            TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS medications (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        stock       INTEGER NOT NULL,
        description TEXT,
        category    TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS prescriptions (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id         INTEGER NOT NULL REFERENCES patients (id),
        doctor_id          INTEGER NOT NULL REFERENCES doctors (id),
        medication_id      INTEGER NOT NULL REFERENCES medications (id),
        quantity           INTEGER NOT NULL,
        dosage             TEXT NOT NULL,
        duration           TEXT NOT NULL,
        prescription_date  TEXT NOT NULL DEFAULT CURRENT_DATE,
        total_amount_cents INTEGER NOT NULL,
        status             TEXT NOT NULL DEFAULT 'pending'
                           CHECK (status IN ('pending', 'filled', 'cancelled'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bills (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id   INTEGER NOT NULL REFERENCES patients (id),
        description  TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        bill_date    TEXT NOT NULL DEFAULT CURRENT_DATE,
        due_date     TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'pending'
                     CHECK (status IN ('pending', 'paid', 'overdue'))
    )
    "#,
];

const SEED_DOCTORS: &[(&str, &str, &str, &str)] = &[
    ("Dr. Sarah Johnson", "Cardiology", "+1-555-123-4567", "sarah.johnson@hospital.com"),
    ("Dr. Michael Chen", "Neurology", "+1-555-234-5678", "michael.chen@hospital.com"),
    ("Dr. Emily Rodriguez", "Pediatrics", "+1-555-345-6789", "emily.rodriguez@hospital.com"),
    ("Dr. David Wilson", "Orthopedics", "+1-555-456-7890", "david.wilson@hospital.com"),
];

// (name, price_cents, stock, description, category)
const SEED_MEDICATIONS: &[(&str, i64, i64, &str, &str)] = &[
    ("Aspirin", 1299, 500, "Pain reliever and anti-inflammatory", "Pain Relief"),
    ("Amoxicillin", 2550, 250, "Antibiotic for bacterial infections", "Antibiotics"),
    ("Lisinopril", 1875, 300, "ACE inhibitor for high blood pressure", "Cardiovascular"),
    ("Metformin", 2200, 400, "Diabetes medication", "Diabetes"),
    ("Ibuprofen", 1599, 600, "Non-steroidal anti-inflammatory drug", "Pain Relief"),
];

pub async fn connect_sqlite(cfg: &Config) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&cfg.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(opts)
        .await?;

    Ok(pool)
}

/// Create missing tables and seed doctors/medications. Safe to call on every start:
/// a table that already has rows is left untouched.
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&mut *tx).await?;
    }

    let doctors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doctors")
        .fetch_one(&mut *tx)
        .await?;
    if doctors == 0 {
        for &(name, specialty, phone, email) in SEED_DOCTORS {
            sqlx::query("INSERT INTO doctors (name, specialty, phone, email) VALUES (?, ?, ?, ?)")
                .bind(name)
                .bind(specialty)
                .bind(phone)
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }
        tracing::info!("seeded {} doctors", SEED_DOCTORS.len());
    }

    let medications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medications")
        .fetch_one(&mut *tx)
        .await?;
    if medications == 0 {
        for &(name, price_cents, stock, description, category) in SEED_MEDICATIONS {
            sqlx::query(
                r#"
                INSERT INTO medications (name, price_cents, stock, description, category)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(price_cents)
            .bind(stock)
            .bind(description)
            .bind(category)
            .execute(&mut *tx)
            .await?;
        }
        tracing::info!("seeded {} medications", SEED_MEDICATIONS.len());
    }

    tx.commit().await
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // One connection: every handle must see the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(
            SqliteConnectOptions::from_str("sqlite::memory:")
                .unwrap()
                .foreign_keys(true),
        )
        .await
        .unwrap();
    init(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_run_seeds_fixed_rows() {
        let pool = test_pool().await;
        assert_eq!(count(&pool, "doctors").await, 4);
        assert_eq!(count(&pool, "medications").await, 5);
        assert_eq!(count(&pool, "patients").await, 0);
    }

    #[tokio::test]
    async fn reinit_is_a_noop_for_seeded_tables() {
        let pool = test_pool().await;
        init(&pool).await.unwrap();
        init(&pool).await.unwrap();
        assert_eq!(count(&pool, "doctors").await, 4);
        assert_eq!(count(&pool, "medications").await, 5);
    }

    #[tokio::test]
    async fn status_column_rejects_unknown_values() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO patients (first_name, last_name, date_of_birth, gender, phone, email, registered_at)
             VALUES ('Ada', 'Lovelace', '1815-12-10', 'female', '555', 'ada@example.com', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let res = sqlx::query(
            "INSERT INTO bills (patient_id, description, amount_cents, bill_date, due_date, status)
             VALUES (1, 'x', 100, '2024-01-01', '2024-01-31', 'refunded')",
        )
        .execute(&pool)
        .await;
        assert!(res.is_err());
    }
}
