use banca_core::Movement;
use banca_engine::ExecutionOutcome;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteDirectDebitRequest {
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub requested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDueRequest {
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Executed,
    NotDue,
    InsufficientFunds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub status: ExecutionStatus,
    pub movement: Option<Movement>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub iban: Option<String>,
    pub balance: Option<Decimal>,
}

impl From<ExecutionOutcome> for ExecutionResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Executed {
                movement,
                origin_balance,
            } => Self {
                status: ExecutionStatus::Executed,
                iban: movement.direct_debit().map(|debit| debit.iban_origen.clone()),
                next_due_at: movement.direct_debit().and_then(|debit| debit.next_due_at()),
                movement: Some(movement),
                balance: Some(origin_balance),
            },
            ExecutionOutcome::NotDue { next_due_at } => Self {
                status: ExecutionStatus::NotDue,
                movement: None,
                next_due_at,
                iban: None,
                balance: None,
            },
            ExecutionOutcome::InsufficientFunds { iban, balance } => Self {
                status: ExecutionStatus::InsufficientFunds,
                movement: None,
                next_due_at: None,
                iban: Some(iban),
                balance: Some(balance),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementListResponse {
    pub items: Vec<Movement>,
}
