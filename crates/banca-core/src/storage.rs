use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BankResult;
use crate::events::MovementEvent;
use crate::models::{Account, Movement};

/// Persistence for movements. Implementations return soft-deleted rows from `find_by_guid` so
/// guids are never reused; every other finder skips them.
#[async_trait]
pub trait MovementRepository: Send + Sync {
    async fn find_by_guid(&self, guid: Uuid) -> anyhow::Result<Option<Movement>>;
    async fn find_active_by_origin_and_creditor(
        &self,
        iban: &str,
        creditor_name: &str,
    ) -> anyhow::Result<Option<Movement>>;
    /// Stores `movement` if the stored copy is still at `movement.version()`, returning it at the
    /// next version. A stale copy fails with [`crate::error::VersionConflict`].
    async fn save(&self, movement: Movement) -> anyhow::Result<Movement>;
    async fn find_all_by_client_guid(&self, client_guid: Uuid) -> anyhow::Result<Vec<Movement>>;
    async fn find_active_direct_debits(&self) -> anyhow::Result<Vec<Movement>>;
}

/// Outbound movement notifications. Delivery is best effort.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn publish(&self, event: MovementEvent) -> anyhow::Result<()>;
}

/// Account balances keyed by IBAN. Operations on one IBAN are applied one at a time.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Fails with `ValidationFailed` when the IBAN is already open or the balance is negative.
    async fn open(&self, account: Account) -> BankResult<()>;
    async fn contains(&self, iban: &str) -> BankResult<bool>;
    async fn balance(&self, iban: &str) -> BankResult<Decimal>;
    /// Returns the new balance, or `InsufficientFunds` leaving the balance untouched.
    async fn debit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal>;
    async fn credit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal>;
}

#[async_trait]
pub trait CardDirectory: Send + Sync {
    /// IBAN of the account a card charges.
    async fn account_for_card(&self, card_number: &str) -> anyhow::Result<Option<String>>;
    async fn register(&self, card_number: &str, iban: &str) -> anyhow::Result<()>;
}
