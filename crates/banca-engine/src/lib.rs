//! Movement engine.
//!
//! Owns the rules that keep balances and movement records consistent:
//!
//! - direct debits: creation with duplicate detection, periodic execution that never debits twice
//!   for the same period, and revocation during the first 24 hours;
//! - one-off movements: transfers (revocable for 24 hours), payroll income and card payments;
//! - soft deletion and client queries.
//!
//! Storage, balances, card resolution and notifications are reached through the ports in
//! [`banca_core::storage`].
//!
//! Every movement update is a versioned save: a copy read before another process changed the
//! movement is refused by the repository and the engine re-reads before deciding again. The
//! per-guid locks only spare retries within one process.
use std::sync::Arc;

use banca_core::{
    BalanceLedger, BankError, BankResult, CardDirectory, Clock, IdSource, Movement,
    MovementEvent, MovementPayload, MovementRepository, NotificationEmitter, OperationType,
    RandomIds, SystemClock,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

mod accounts;
mod direct_debits;
pub mod locks;
mod movements;

pub use direct_debits::{DueRunReport, ExecutionOutcome};
pub use locks::KeyedLocks;

/// How long after creation a movement can still be revoked.
pub const REVOCATION_WINDOW_HOURS: i64 = 24;

/// Reads of a movement before giving up on a save that keeps losing to other writers.
const SAVE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct MovementEngine {
    repository: Arc<dyn MovementRepository>,
    ledger: Arc<dyn BalanceLedger>,
    events: mpsc::UnboundedSender<MovementEvent>,
    cards: Arc<dyn CardDirectory>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl MovementEngine {
    /// Builds the engine and spawns the task delivering its events to `notifier`, so it must be
    /// called inside a Tokio runtime.
    pub fn new(
        repository: Arc<dyn MovementRepository>,
        ledger: Arc<dyn BalanceLedger>,
        notifier: Arc<dyn NotificationEmitter>,
        cards: Arc<dyn CardDirectory>,
    ) -> Self {
        let (events, outbox) = mpsc::unbounded_channel();
        tokio::spawn(deliver(notifier, outbox));
        Self {
            repository,
            ledger,
            events,
            cards,
            ids: Arc::new(RandomIds),
            clock: Arc::new(SystemClock),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Live movement by guid; soft-deleted movements count as missing.
    pub async fn find_movement(&self, guid: Uuid) -> BankResult<Movement> {
        match self.repository.find_by_guid(guid).await? {
            Some(movement) if !movement.is_deleted() => Ok(movement),
            _ => Err(BankError::NotFound(guid)),
        }
    }

    pub async fn movements_for_client(&self, client_guid: Uuid) -> BankResult<Vec<Movement>> {
        Ok(self.repository.find_all_by_client_guid(client_guid).await?)
    }

    /// Hides a movement from every listing. Balances are left as they are.
    pub async fn delete_movement(&self, guid: Uuid) -> BankResult<Movement> {
        let _guard = self.locks.lock(movement_key(guid)).await;
        let saved = self
            .update_movement(guid, |movement| {
                if let Some(debit) = movement.direct_debit_mut() {
                    debit.active = false;
                }
                movement.soft_delete();
                Ok(())
            })
            .await?;
        self.announce(OperationType::Delete, &saved);
        Ok(saved)
    }

    /// Applies `change` to the live movement and saves it, reading again whenever another
    /// writer got there first. `change` sees the fresh copy each time and may refuse it.
    async fn update_movement<F>(&self, guid: Uuid, mut change: F) -> BankResult<Movement>
    where
        F: FnMut(&mut Movement) -> BankResult<()> + Send,
    {
        for _ in 0..SAVE_ATTEMPTS {
            let mut movement = self.find_movement(guid).await?;
            change(&mut movement)?;
            match self.repository.save(movement).await.map_err(BankError::from) {
                Err(BankError::Conflict(_)) => {
                    debug!(movement = %guid, "movement changed concurrently, reading it again");
                }
                saved => return saved,
            }
        }
        Err(BankError::Conflict(guid))
    }

    /// Brings back a movement soft-deleted by a step that then failed. Failures are logged.
    async fn restore_movement(&self, guid: Uuid) {
        for _ in 0..SAVE_ATTEMPTS {
            let mut movement = match self.repository.find_by_guid(guid).await {
                Ok(Some(movement)) => movement,
                Ok(None) => break,
                Err(err) => {
                    error!(movement = %guid, "movement not restored: {err:#}");
                    return;
                }
            };
            movement.restore();
            match self.repository.save(movement).await.map_err(BankError::from) {
                Ok(_) => return,
                Err(BankError::Conflict(_)) => continue,
                Err(err) => {
                    error!(movement = %guid, "movement not restored: {err:#}");
                    return;
                }
            }
        }
        error!(movement = %guid, "movement not restored");
    }

    async fn new_movement(
        &self,
        client_guid: Uuid,
        payload: impl FnOnce(Uuid) -> MovementPayload,
    ) -> BankResult<Movement> {
        let guid = self.ids.movement_guid();
        if self.repository.find_by_guid(guid).await?.is_some() {
            return Err(anyhow::anyhow!("movement guid {guid} already issued").into());
        }
        Ok(Movement::new(
            guid,
            client_guid,
            payload(guid),
            self.clock.now(),
        ))
    }

    async fn persist_new(
        &self,
        client_guid: Uuid,
        payload: MovementPayload,
    ) -> BankResult<Movement> {
        let movement = self.new_movement(client_guid, |_| payload).await?;
        Ok(self.repository.save(movement).await?)
    }

    /// Queues the event for delivery and returns without waiting for it.
    fn announce(&self, operation: OperationType, movement: &Movement) {
        let event = MovementEvent::new(operation, movement, self.clock.now());
        if self.events.send(event).is_err() {
            warn!(movement = %movement.guid(), operation = ?operation, "event delivery stopped");
        }
    }

    /// Credits `destination` when it is one of ours, returning whether it was credited.
    async fn credit_if_internal(&self, destination: &str, amount: Decimal) -> BankResult<bool> {
        if !self.ledger.contains(destination).await? {
            return Ok(false);
        }
        self.ledger.credit(destination, amount).await?;
        Ok(true)
    }

    /// Puts back funds taken from `origin` (and given to `destination`) after a later step
    /// failed. Failures here are logged, the original error is what the caller sees.
    async fn compensate(&self, origin: &str, destination: Option<&str>, amount: Decimal) {
        if let Some(destination) = destination {
            if let Err(err) = self.ledger.debit(destination, amount).await {
                error!(iban = %destination, %amount, "compensating debit failed: {err}");
            }
        }
        if let Err(err) = self.ledger.credit(origin, amount).await {
            error!(iban = %origin, %amount, "compensating credit failed: {err}");
        }
    }
}

async fn deliver(
    notifier: Arc<dyn NotificationEmitter>,
    mut outbox: mpsc::UnboundedReceiver<MovementEvent>,
) {
    while let Some(event) = outbox.recv().await {
        let guid = event.movement_guid;
        let operation = event.operation_type;
        if let Err(err) = notifier.publish(event).await {
            warn!(movement = %guid, operation = ?operation, "failed to publish movement event: {err:#}");
        }
    }
}

fn movement_key(guid: Uuid) -> String {
    format!("movement:{guid}")
}

fn within_revocation_window(created_at: DateTime<Utc>, request_time: DateTime<Utc>) -> bool {
    request_time - created_at <= Duration::hours(REVOCATION_WINDOW_HOURS)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn revocation_window_is_inclusive_of_the_last_moment() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        assert!(within_revocation_window(created, created + Duration::minutes(23 * 60 + 59)));
        assert!(within_revocation_window(created, created + Duration::hours(24)));
        assert!(!within_revocation_window(created, created + Duration::minutes(24 * 60 + 1)));
    }
}
