use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use banca_core::validation::mask_card;
use banca_core::{
    CardDirectory, Movement, MovementEvent, MovementRepository, NotificationEmitter,
    VersionConflict,
};
use tokio::sync::{Notify, RwLock};
use tokio::time::{Instant, timeout_at};
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryMovementRepository {
    movements: RwLock<HashMap<Uuid, Movement>>,
}

impl InMemoryMovementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.movements.read().await.len()
    }
}

fn is_active_debit_for(movement: &Movement, iban: &str, creditor_name: &str) -> bool {
    !movement.is_deleted()
        && movement.direct_debit().is_some_and(|debit| {
            debit.active && debit.iban_origen == iban && debit.creditor_name == creditor_name
        })
}

#[async_trait]
impl MovementRepository for InMemoryMovementRepository {
    async fn find_by_guid(&self, guid: Uuid) -> anyhow::Result<Option<Movement>> {
        Ok(self.movements.read().await.get(&guid).cloned())
    }

    async fn find_active_by_origin_and_creditor(
        &self,
        iban: &str,
        creditor_name: &str,
    ) -> anyhow::Result<Option<Movement>> {
        let movements = self.movements.read().await;
        Ok(movements
            .values()
            .find(|movement| is_active_debit_for(movement, iban, creditor_name))
            .cloned())
    }

    async fn save(&self, mut movement: Movement) -> anyhow::Result<Movement> {
        let mut movements = self.movements.write().await;
        let stored_version = movements.get(&movement.guid()).map_or(0, Movement::version);
        if stored_version != movement.version() {
            return Err(VersionConflict {
                guid: movement.guid(),
                expected: movement.version(),
            }
            .into());
        }
        movement.advance_version();
        movements.insert(movement.guid(), movement.clone());
        Ok(movement)
    }

    async fn find_all_by_client_guid(&self, client_guid: Uuid) -> anyhow::Result<Vec<Movement>> {
        let movements = self.movements.read().await;
        let mut owned: Vec<Movement> = movements
            .values()
            .filter(|movement| movement.client_guid() == client_guid && !movement.is_deleted())
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(owned)
    }

    async fn find_active_direct_debits(&self) -> anyhow::Result<Vec<Movement>> {
        let movements = self.movements.read().await;
        let mut active: Vec<Movement> = movements
            .values()
            .filter(|movement| {
                !movement.is_deleted() && movement.direct_debit().is_some_and(|debit| debit.active)
            })
            .cloned()
            .collect();
        active.sort_by_key(Movement::created_at);
        Ok(active)
    }
}

/// Keeps every published event, optionally failing each publish to mimic a bus outage.
#[derive(Default)]
pub struct RecordingNotifier {
    events: RwLock<Vec<MovementEvent>>,
    failing: AtomicBool,
    published: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<MovementEvent> {
        self.events.read().await.clone()
    }

    /// Events seen once at least `count` arrived, or whatever arrived before `within` elapsed.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<MovementEvent> {
        let deadline = Instant::now() + within;
        loop {
            let published = self.published.notified();
            {
                let events = self.events.read().await;
                if events.len() >= count {
                    return events.clone();
                }
            }
            if timeout_at(deadline, published).await.is_err() {
                return self.events().await;
            }
        }
    }
}

#[async_trait]
impl NotificationEmitter for RecordingNotifier {
    async fn publish(&self, event: MovementEvent) -> anyhow::Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            anyhow::bail!("notification bus unavailable");
        }
        self.events.write().await.push(event);
        self.published.notify_waiters();
        Ok(())
    }
}

/// Writes events to the log instead of a bus.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationEmitter for LogNotifier {
    async fn publish(&self, event: MovementEvent) -> anyhow::Result<()> {
        info!(
            movement = %event.movement_guid,
            kind = event.entity_kind.as_str(),
            operation = ?event.operation_type,
            "movement event"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCardDirectory {
    cards: RwLock<HashMap<String, String>>,
}

impl InMemoryCardDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardDirectory for InMemoryCardDirectory {
    async fn account_for_card(&self, card_number: &str) -> anyhow::Result<Option<String>> {
        Ok(self.cards.read().await.get(card_number).cloned())
    }

    async fn register(&self, card_number: &str, iban: &str) -> anyhow::Result<()> {
        let mut cards = self.cards.write().await;
        if cards.contains_key(card_number) {
            anyhow::bail!("card {} already registered", mask_card(card_number));
        }
        cards.insert(card_number.to_string(), iban.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use banca_core::{DirectDebit, MovementPayload, OperationType, Periodicity};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;

    fn direct_debit(guid: u128, client: Uuid, creditor: &str, minutes: i64) -> Movement {
        let created_at =
            Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(minutes);
        Movement::new(
            Uuid::from_u128(guid),
            client,
            MovementPayload::DirectDebit(DirectDebit {
                guid: Uuid::from_u128(guid),
                iban_origen: "ES7620770024003102575766".to_string(),
                iban_destino: "ES9121000418450200051332".to_string(),
                amount: Decimal::new(30, 0),
                creditor_name: creditor.to_string(),
                start_date: created_at,
                periodicity: Periodicity::Monthly,
                active: true,
                last_executed_at: None,
            }),
            created_at,
        )
    }

    #[tokio::test]
    async fn active_lookup_skips_revoked_and_deleted() {
        let repository = InMemoryMovementRepository::new();
        let client = Uuid::from_u128(99);

        let mut revoked = direct_debit(1, client, "Gym", 0);
        if let Some(debit) = revoked.direct_debit_mut() {
            debit.active = false;
        }
        let mut deleted = direct_debit(2, client, "Gym", 1);
        deleted.soft_delete();
        repository.save(revoked).await.unwrap();
        repository.save(deleted).await.unwrap();

        let found = repository
            .find_active_by_origin_and_creditor("ES7620770024003102575766", "Gym")
            .await
            .unwrap();
        assert!(found.is_none());

        repository.save(direct_debit(3, client, "Gym", 2)).await.unwrap();
        let found = repository
            .find_active_by_origin_and_creditor("ES7620770024003102575766", "Gym")
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.guid()), Some(Uuid::from_u128(3)));
    }

    #[tokio::test]
    async fn client_listing_is_newest_first() {
        let repository = InMemoryMovementRepository::new();
        let client = Uuid::from_u128(7);
        repository.save(direct_debit(1, client, "Gym", 0)).await.unwrap();
        repository.save(direct_debit(2, client, "Pool", 5)).await.unwrap();
        repository
            .save(direct_debit(3, Uuid::from_u128(8), "Gym", 10))
            .await
            .unwrap();

        let listed: Vec<Uuid> = repository
            .find_all_by_client_guid(client)
            .await
            .unwrap()
            .iter()
            .map(Movement::guid)
            .collect();
        assert_eq!(listed, vec![Uuid::from_u128(2), Uuid::from_u128(1)]);
    }

    #[tokio::test]
    async fn deleted_movements_stay_addressable_by_guid() {
        let repository = InMemoryMovementRepository::new();
        let mut movement = direct_debit(1, Uuid::nil(), "Gym", 0);
        movement.soft_delete();
        repository.save(movement).await.unwrap();

        let found = repository.find_by_guid(Uuid::from_u128(1)).await.unwrap();
        assert!(found.is_some_and(|m| m.is_deleted()));
        assert!(repository.find_active_direct_debits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_copies_are_refused() {
        let repository = InMemoryMovementRepository::new();
        let saved = repository.save(direct_debit(1, Uuid::nil(), "Gym", 0)).await.unwrap();
        assert_eq!(saved.version(), 1);

        let mut first = saved.clone();
        first.soft_delete();
        let first = repository.save(first).await.unwrap();
        assert_eq!(first.version(), 2);

        let err = repository.save(saved).await.unwrap_err();
        let conflict = err.downcast_ref::<VersionConflict>().unwrap();
        assert_eq!(conflict.expected, 1);
        assert!(repository.find_by_guid(Uuid::from_u128(1)).await.unwrap().unwrap().is_deleted());

        let err = repository
            .save(direct_debit(1, Uuid::nil(), "Gym", 0))
            .await
            .unwrap_err();
        assert!(err.is::<VersionConflict>());
    }

    #[tokio::test]
    async fn waiting_for_events_returns_once_they_arrive() {
        let notifier = std::sync::Arc::new(RecordingNotifier::new());
        let movement = direct_debit(1, Uuid::nil(), "Gym", 0);

        let publisher = std::sync::Arc::clone(&notifier);
        let event = MovementEvent::new(OperationType::Create, &movement, Utc::now());
        let handle = tokio::spawn(async move { publisher.publish(event).await });

        let events = notifier.wait_for(1, Duration::from_secs(5)).await;
        assert_eq!(events.len(), 1);
        handle.await.unwrap().unwrap();
        assert!(notifier.wait_for(2, Duration::from_millis(20)).await.len() < 2);
    }

    #[tokio::test]
    async fn card_numbers_are_registered_once() {
        let cards = InMemoryCardDirectory::new();
        cards.register("4111111111111111", "ES7620770024003102575766").await.unwrap();

        assert!(cards.register("4111111111111111", "ES9121000418450200051332").await.is_err());
        assert_eq!(
            cards.account_for_card("4111111111111111").await.unwrap().as_deref(),
            Some("ES7620770024003102575766")
        );
    }

    #[tokio::test]
    async fn failing_notifier_keeps_nothing() {
        let notifier = RecordingNotifier::failing();
        let movement = direct_debit(1, Uuid::nil(), "Gym", 0);
        let event = MovementEvent::new(OperationType::Create, &movement, Utc::now());

        assert!(notifier.publish(event).await.is_err());
        assert!(notifier.events().await.is_empty());
    }
}
