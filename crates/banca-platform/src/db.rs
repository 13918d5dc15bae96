use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};

const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        iban TEXT PRIMARY KEY,
        client_guid UUID NOT NULL,
        balance NUMERIC(19, 4) NOT NULL CHECK (balance >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        card_number TEXT PRIMARY KEY,
        iban TEXT NOT NULL REFERENCES accounts (iban)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        guid UUID PRIMARY KEY,
        client_guid UUID NOT NULL,
        kind TEXT NOT NULL,
        iban_origen TEXT,
        creditor_name TEXT,
        active BOOLEAN,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "ALTER TABLE movements ADD COLUMN IF NOT EXISTS version BIGINT NOT NULL DEFAULT 0",
    "CREATE INDEX IF NOT EXISTS movements_client_idx ON movements (client_guid, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS movements_active_debits_idx ON movements (kind) WHERE active AND NOT is_deleted",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS movements_active_debit_creditor_idx
        ON movements (iban_origen, creditor_name)
        WHERE kind = 'DIRECT_DEBIT' AND active AND NOT is_deleted
    "#,
];

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
