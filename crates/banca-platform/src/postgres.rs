use async_trait::async_trait;
use banca_core::validation::{FieldErrors, ensure_non_negative, mask_card};
use banca_core::{
    Account, BalanceLedger, BankError, BankResult, CardDirectory, Movement, MovementKind,
    MovementRepository, VersionConflict,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SELECT_DOCUMENT: &str = "SELECT document FROM movements";

/// Movements stored one row per document, with the columns the finders filter on pulled out
/// next to the JSON body.
#[derive(Clone)]
pub struct PgMovementRepository {
    pool: PgPool,
}

impl PgMovementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> anyhow::Result<Movement> {
    let Json(movement): Json<Movement> = row.try_get("document")?;
    Ok(movement)
}

#[async_trait]
impl MovementRepository for PgMovementRepository {
    async fn find_by_guid(&self, guid: Uuid) -> anyhow::Result<Option<Movement>> {
        let row = sqlx::query(&format!("{SELECT_DOCUMENT} WHERE guid = $1"))
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_active_by_origin_and_creditor(
        &self,
        iban: &str,
        creditor_name: &str,
    ) -> anyhow::Result<Option<Movement>> {
        let row = sqlx::query(&format!(
            "{SELECT_DOCUMENT} WHERE kind = $1 AND iban_origen = $2 AND creditor_name = $3 AND active AND NOT is_deleted LIMIT 1"
        ))
        .bind(MovementKind::DirectDebit.as_str())
        .bind(iban)
        .bind(creditor_name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn save(&self, mut movement: Movement) -> anyhow::Result<Movement> {
        let expected = movement.version();
        movement.advance_version();
        let version = i64::try_from(movement.version())?;
        let (iban_origen, creditor_name, active) = match movement.direct_debit() {
            Some(debit) => (
                Some(debit.iban_origen.as_str()),
                Some(debit.creditor_name.as_str()),
                Some(debit.active),
            ),
            None => (None, None, None),
        };

        let written = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO movements (
                    guid, client_guid, kind, iban_origen, creditor_name, active, is_deleted,
                    created_at, document, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (guid) DO NOTHING
                "#,
            )
            .bind(movement.guid())
            .bind(movement.client_guid())
            .bind(movement.kind().as_str())
            .bind(iban_origen)
            .bind(creditor_name)
            .bind(active)
            .bind(movement.is_deleted())
            .bind(movement.created_at())
            .bind(Json(&movement))
            .bind(version)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE movements
                SET active = $2, is_deleted = $3, document = $4, version = $5
                WHERE guid = $1 AND version = $6
                "#,
            )
            .bind(movement.guid())
            .bind(active)
            .bind(movement.is_deleted())
            .bind(Json(&movement))
            .bind(version)
            .bind(version - 1)
            .execute(&self.pool)
            .await
        };

        let written = match written {
            Ok(result) => result,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() && creditor_name.is_some() => {
                return Err(BankError::DuplicatedDirectDebit {
                    iban: iban_origen.unwrap_or_default().to_string(),
                    creditor: creditor_name.unwrap_or_default().to_string(),
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };
        if written.rows_affected() == 0 {
            return Err(VersionConflict {
                guid: movement.guid(),
                expected,
            }
            .into());
        }

        Ok(movement)
    }

    async fn find_all_by_client_guid(&self, client_guid: Uuid) -> anyhow::Result<Vec<Movement>> {
        let rows = sqlx::query(&format!(
            "{SELECT_DOCUMENT} WHERE client_guid = $1 AND NOT is_deleted ORDER BY created_at DESC"
        ))
        .bind(client_guid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode).collect()
    }

    async fn find_active_direct_debits(&self) -> anyhow::Result<Vec<Movement>> {
        let rows = sqlx::query(&format!(
            "{SELECT_DOCUMENT} WHERE kind = $1 AND active AND NOT is_deleted ORDER BY created_at"
        ))
        .bind(MovementKind::DirectDebit.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode).collect()
    }
}

/// Balances kept in the `accounts` table. Each update is a single conditional statement, so the
/// row lock orders concurrent operations on one IBAN.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current(&self, iban: &str) -> BankResult<Option<Decimal>> {
        sqlx::query_scalar("SELECT balance FROM accounts WHERE iban = $1")
            .bind(iban)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }
}

fn infrastructure(err: sqlx::Error) -> BankError {
    BankError::Infrastructure(err.into())
}

#[async_trait]
impl BalanceLedger for PgLedger {
    async fn open(&self, account: Account) -> BankResult<()> {
        if account.balance < Decimal::ZERO {
            return Err(BankError::ValidationFailed(FieldErrors::single(
                "balance",
                "must not be negative",
            )));
        }
        let inserted = sqlx::query(
            "INSERT INTO accounts (iban, client_guid, balance) VALUES ($1, $2, $3) ON CONFLICT (iban) DO NOTHING",
        )
        .bind(&account.iban)
        .bind(account.client_guid)
        .bind(account.balance)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;

        if inserted.rows_affected() == 0 {
            return Err(BankError::ValidationFailed(FieldErrors::single(
                "iban",
                "account already exists",
            )));
        }
        Ok(())
    }

    async fn contains(&self, iban: &str) -> BankResult<bool> {
        Ok(self.current(iban).await?.is_some())
    }

    async fn balance(&self, iban: &str) -> BankResult<Decimal> {
        self.current(iban)
            .await?
            .ok_or_else(|| BankError::UnknownIban(iban.to_string()))
    }

    async fn debit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        ensure_non_negative(amount)?;
        let updated: Option<Decimal> = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance - $2 WHERE iban = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(iban)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;

        match updated {
            Some(balance) => Ok(balance),
            None => match self.current(iban).await? {
                Some(balance) => Err(BankError::InsufficientFunds {
                    iban: iban.to_string(),
                    balance,
                }),
                None => Err(BankError::UnknownIban(iban.to_string())),
            },
        }
    }

    async fn credit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        ensure_non_negative(amount)?;
        let updated: Option<Decimal> = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance + $2 WHERE iban = $1 RETURNING balance",
        )
        .bind(iban)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;

        updated.ok_or_else(|| BankError::UnknownIban(iban.to_string()))
    }
}

#[derive(Clone)]
pub struct PgCardDirectory {
    pool: PgPool,
}

impl PgCardDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardDirectory for PgCardDirectory {
    async fn account_for_card(&self, card_number: &str) -> anyhow::Result<Option<String>> {
        let iban: Option<String> = sqlx::query_scalar("SELECT iban FROM cards WHERE card_number = $1")
            .bind(card_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(iban)
    }

    async fn register(&self, card_number: &str, iban: &str) -> anyhow::Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO cards (card_number, iban) VALUES ($1, $2) ON CONFLICT (card_number) DO NOTHING",
        )
        .bind(card_number)
        .bind(iban)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            anyhow::bail!("card {} already registered", mask_card(card_number));
        }
        Ok(())
    }
}
