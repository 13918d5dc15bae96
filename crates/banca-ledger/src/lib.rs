use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use banca_core::validation::{FieldErrors, ensure_non_negative};
use banca_core::{Account, BalanceLedger, BankError, BankResult};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Balances held in memory. Each IBAN owns its own lock so operations on different accounts
/// never wait on each other; the map lock is only held to look the account up.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<String, Arc<Mutex<Decimal>>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> BankResult<Self> {
        let ledger = Self::new();
        for account in accounts {
            ledger.open(account).await?;
        }
        Ok(ledger)
    }

    async fn slot(&self, iban: &str) -> BankResult<Arc<Mutex<Decimal>>> {
        let accounts = self.accounts.read().await;
        accounts
            .get(iban)
            .cloned()
            .ok_or_else(|| BankError::UnknownIban(iban.to_string()))
    }
}

#[async_trait]
impl BalanceLedger for InMemoryLedger {
    async fn open(&self, account: Account) -> BankResult<()> {
        if account.balance < Decimal::ZERO {
            return Err(BankError::ValidationFailed(FieldErrors::single(
                "balance",
                "must not be negative",
            )));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.iban) {
            return Err(BankError::ValidationFailed(FieldErrors::single(
                "iban",
                "account already exists",
            )));
        }
        debug!(iban = %account.iban, balance = %account.balance, "account opened");
        accounts.insert(account.iban, Arc::new(Mutex::new(account.balance)));
        Ok(())
    }

    async fn contains(&self, iban: &str) -> BankResult<bool> {
        Ok(self.accounts.read().await.contains_key(iban))
    }

    async fn balance(&self, iban: &str) -> BankResult<Decimal> {
        let slot = self.slot(iban).await?;
        let balance = *slot.lock().await;
        Ok(balance)
    }

    async fn debit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        ensure_non_negative(amount)?;
        let slot = self.slot(iban).await?;
        let mut balance = slot.lock().await;

        if amount > *balance {
            return Err(BankError::InsufficientFunds {
                iban: iban.to_string(),
                balance: *balance,
            });
        }
        *balance -= amount;
        debug!(%iban, %amount, balance = %*balance, "debit applied");
        Ok(*balance)
    }

    async fn credit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        ensure_non_negative(amount)?;
        let slot = self.slot(iban).await?;
        let mut balance = slot.lock().await;

        *balance += amount;
        debug!(%iban, %amount, balance = %*balance, "credit applied");
        Ok(*balance)
    }
}
