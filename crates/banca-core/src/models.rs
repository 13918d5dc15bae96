use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BankError;
use crate::validation::FieldErrors;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Transfer,
    PayrollIncome,
    CardPayment,
    DirectDebit,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::PayrollIncome => "PAYROLL_INCOME",
            Self::CardPayment => "CARD_PAYMENT",
            Self::DirectDebit => "DIRECT_DEBIT",
        }
    }
}

/// Recurrence interval of a direct debit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Periodicity {
    /// Moment one period after `from`. Month based periods follow the calendar and clamp to the
    /// last day of shorter months.
    pub fn advance(self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => from.checked_add_signed(Duration::days(1)),
            Self::Weekly => from.checked_add_signed(Duration::weeks(1)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Quarterly => from.checked_add_months(Months::new(3)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub beneficiary_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayrollIncome {
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub company_name: String,
    pub company_tax_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardPayment {
    pub card_number: String,
    pub amount: Decimal,
    pub merchant_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectDebitState {
    Created,
    Executed,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectDebit {
    pub guid: Uuid,
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub creditor_name: String,
    pub start_date: DateTime<Utc>,
    pub periodicity: Periodicity,
    pub active: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl DirectDebit {
    pub fn state(&self) -> DirectDebitState {
        match (self.active, self.last_executed_at) {
            (false, _) => DirectDebitState::Revoked,
            (true, None) => DirectDebitState::Created,
            (true, Some(_)) => DirectDebitState::Executed,
        }
    }

    /// Earliest moment the next execution may happen, `None` once revoked.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        if !self.active {
            return None;
        }
        match self.last_executed_at {
            None => Some(self.start_date),
            Some(last) => self.periodicity.advance(last),
        }
    }

    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.next_due_at().is_some_and(|due| as_of >= due)
    }
}

/// Variant specific data of a movement. Exactly one is carried, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementPayload {
    Transfer(Transfer),
    PayrollIncome(PayrollIncome),
    CardPayment(CardPayment),
    DirectDebit(DirectDebit),
}

impl MovementPayload {
    pub fn kind(&self) -> MovementKind {
        match self {
            Self::Transfer(_) => MovementKind::Transfer,
            Self::PayrollIncome(_) => MovementKind::PayrollIncome,
            Self::CardPayment(_) => MovementKind::CardPayment,
            Self::DirectDebit(_) => MovementKind::DirectDebit,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Self::Transfer(transfer) => transfer.amount,
            Self::PayrollIncome(income) => income.amount,
            Self::CardPayment(payment) => payment.amount,
            Self::DirectDebit(debit) => debit.amount,
        }
    }
}

/// Loose shape used by callers that still send one nullable field per variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadParts {
    pub transfer: Option<Transfer>,
    pub payroll_income: Option<PayrollIncome>,
    pub card_payment: Option<CardPayment>,
    pub direct_debit: Option<DirectDebit>,
}

impl PayloadParts {
    /// Collapses the parts into a single payload matching `kind`.
    pub fn into_payload(self, kind: MovementKind) -> Result<MovementPayload, BankError> {
        let mut populated = Vec::with_capacity(1);
        if let Some(transfer) = self.transfer {
            populated.push(MovementPayload::Transfer(transfer));
        }
        if let Some(income) = self.payroll_income {
            populated.push(MovementPayload::PayrollIncome(income));
        }
        if let Some(payment) = self.card_payment {
            populated.push(MovementPayload::CardPayment(payment));
        }
        if let Some(debit) = self.direct_debit {
            populated.push(MovementPayload::DirectDebit(debit));
        }

        let mut errors = FieldErrors::new();
        match populated.len() {
            0 => errors.add("payload", "invalid movement kind: no payload supplied"),
            1 if populated[0].kind() != kind => errors.add(
                "payload",
                format!(
                    "invalid movement kind: expected {} payload, got {}",
                    kind.as_str(),
                    populated[0].kind().as_str()
                ),
            ),
            1 => {}
            count => errors.add(
                "payload",
                format!("invalid movement kind: {count} payloads supplied, expected one"),
            ),
        }
        errors.into_result()?;

        populated
            .pop()
            .ok_or_else(|| BankError::ValidationFailed(FieldErrors::single("payload", "missing")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    guid: Uuid,
    client_guid: Uuid,
    #[serde(flatten)]
    payload: MovementPayload,
    #[serde(default)]
    is_deleted: bool,
    created_at: DateTime<Utc>,
    /// Bumped by the repository on every save; a save carrying a stale version is refused.
    #[serde(default)]
    version: u64,
}

impl Movement {
    pub fn new(
        guid: Uuid,
        client_guid: Uuid,
        payload: MovementPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            guid,
            client_guid,
            payload,
            is_deleted: false,
            created_at,
            version: 0,
        }
    }

    pub fn from_parts(
        guid: Uuid,
        client_guid: Uuid,
        kind: MovementKind,
        parts: PayloadParts,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BankError> {
        let payload = parts.into_payload(kind)?;
        Ok(Self::new(guid, client_guid, payload, created_at))
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn client_guid(&self) -> Uuid {
        self.client_guid
    }

    pub fn kind(&self) -> MovementKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &MovementPayload {
        &self.payload
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Marks the movement as stored once more. Only repositories call this.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Undoes [`Movement::soft_delete`] when the step that required it could not complete.
    pub fn restore(&mut self) {
        self.is_deleted = false;
    }

    pub fn direct_debit(&self) -> Option<&DirectDebit> {
        match &self.payload {
            MovementPayload::DirectDebit(debit) => Some(debit),
            _ => None,
        }
    }

    pub fn direct_debit_mut(&mut self) -> Option<&mut DirectDebit> {
        match &mut self.payload {
            MovementPayload::DirectDebit(debit) => Some(debit),
            _ => None,
        }
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        match &self.payload {
            MovementPayload::Transfer(transfer) => Some(transfer),
            _ => None,
        }
    }
}

/// Identity record a client is linked to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub guid: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub guid: Uuid,
    pub user: UserRef,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub iban: String,
    pub client_guid: Uuid,
    pub balance: Decimal,
}

/// Debit card charging an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_number: String,
    pub iban: String,
}
