use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("unknown iban {0}")]
    UnknownIban(String),
    #[error("unknown card {0}")]
    UnknownCard(String),
    #[error("an active direct debit already exists for {iban} and creditor {creditor}")]
    DuplicatedDirectDebit { iban: String, creditor: String },
    #[error("insufficient funds in {iban}: balance {balance}")]
    InsufficientFunds { iban: String, balance: Decimal },
    #[error("movement {0} not found")]
    NotFound(Uuid),
    #[error("direct debit {0} is not active")]
    NotActive(Uuid),
    #[error("movement {0} cannot be revoked")]
    NotRevocable(Uuid),
    #[error("revocation window for movement {0} has expired")]
    RevocationWindowExpired(Uuid),
    #[error("movement {0} was changed by another request")]
    Conflict(Uuid),
    #[error(transparent)]
    Infrastructure(anyhow::Error),
}

/// Returned by repositories when the stored movement no longer carries the version the caller
/// read.
#[derive(Debug, Error)]
#[error("movement {guid} is no longer at version {expected}")]
pub struct VersionConflict {
    pub guid: Uuid,
    pub expected: u64,
}

/// Adapters may report business outcomes through `anyhow`; those keep their meaning.
impl From<anyhow::Error> for BankError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<BankError>() {
            Ok(bank) => return bank,
            Err(err) => err,
        };
        match err.downcast::<VersionConflict>() {
            Ok(conflict) => Self::Conflict(conflict.guid),
            Err(err) => Self::Infrastructure(err),
        }
    }
}

impl BankError {
    /// Business and validation failures the caller can act on, as opposed to storage or bus
    /// outages.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Infrastructure(_))
    }
}

pub type BankResult<T> = Result<T, BankError>;
