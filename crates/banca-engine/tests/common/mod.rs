#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use banca_core::{
    Account, BalanceLedger, BankError, BankResult, CardDirectory, CreateDirectDebit, FixedClock,
    Movement, MovementEvent, MovementRepository, Periodicity, SequentialIds,
};
use banca_engine::MovementEngine;
use banca_ledger::InMemoryLedger;
use banca_store::{InMemoryCardDirectory, InMemoryMovementRepository, RecordingNotifier};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const PAYER: &str = "ES7620770024003102575766";
pub const CREDITOR: &str = "ES9121000418450200051332";
pub const EXTERNAL: &str = "DE89370400440532013000";
pub const UNKNOWN: &str = "ES0000000000000000000001";
pub const CARD: &str = "4111111111111111";

/// In-memory repository whose next saves can be made to fail and whose lookups can be slowed
/// down to widen races between engines.
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemoryMovementRepository,
    failing_saves: AtomicUsize,
    lookup_delay_ms: AtomicU64,
}

impl FlakyRepository {
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn slow_lookups(&self, millis: u64) {
        self.lookup_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl MovementRepository for FlakyRepository {
    async fn find_by_guid(&self, guid: Uuid) -> anyhow::Result<Option<Movement>> {
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.inner.find_by_guid(guid).await
    }

    async fn find_active_by_origin_and_creditor(
        &self,
        iban: &str,
        creditor_name: &str,
    ) -> anyhow::Result<Option<Movement>> {
        self.inner
            .find_active_by_origin_and_creditor(iban, creditor_name)
            .await
    }

    async fn save(&self, movement: Movement) -> anyhow::Result<Movement> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if failing.is_ok() {
            anyhow::bail!("storage unavailable");
        }
        self.inner.save(movement).await
    }

    async fn find_all_by_client_guid(&self, client_guid: Uuid) -> anyhow::Result<Vec<Movement>> {
        self.inner.find_all_by_client_guid(client_guid).await
    }

    async fn find_active_direct_debits(&self) -> anyhow::Result<Vec<Movement>> {
        self.inner.find_active_direct_debits().await
    }
}

/// In-memory ledger that can refuse every credit to one IBAN.
pub struct FlakyLedger {
    inner: InMemoryLedger,
    failing_credits: Mutex<Option<String>>,
}

impl FlakyLedger {
    pub fn fail_credits_to(&self, iban: &str) {
        *self.failing_credits.lock().unwrap_or_else(PoisonError::into_inner) = Some(iban.to_string());
    }

    pub fn heal(&self) {
        *self.failing_credits.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn refuses_credit(&self, iban: &str) -> bool {
        self.failing_credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(iban)
    }
}

#[async_trait]
impl BalanceLedger for FlakyLedger {
    async fn open(&self, account: Account) -> BankResult<()> {
        self.inner.open(account).await
    }

    async fn contains(&self, iban: &str) -> BankResult<bool> {
        self.inner.contains(iban).await
    }

    async fn balance(&self, iban: &str) -> BankResult<Decimal> {
        self.inner.balance(iban).await
    }

    async fn debit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        self.inner.debit(iban, amount).await
    }

    async fn credit(&self, iban: &str, amount: Decimal) -> BankResult<Decimal> {
        if self.refuses_credit(iban) {
            return Err(BankError::Infrastructure(anyhow::anyhow!("ledger unavailable")));
        }
        self.inner.credit(iban, amount).await
    }
}

pub struct Harness {
    pub engine: MovementEngine,
    pub ledger: Arc<FlakyLedger>,
    pub repository: Arc<FlakyRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub cards: Arc<InMemoryCardDirectory>,
    pub clock: Arc<FixedClock>,
    pub client: Uuid,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn eur(units: i64) -> Decimal {
    Decimal::new(units, 0)
}

pub async fn harness() -> Harness {
    harness_with_notifier(RecordingNotifier::new()).await
}

pub async fn harness_with_notifier(notifier: RecordingNotifier) -> Harness {
    let client = Uuid::from_u128(0xC11E17);
    let ledger = Arc::new(FlakyLedger {
        inner: InMemoryLedger::with_accounts([
            Account {
                iban: PAYER.to_string(),
                client_guid: client,
                balance: eur(120),
            },
            Account {
                iban: CREDITOR.to_string(),
                client_guid: Uuid::from_u128(2),
                balance: Decimal::ZERO,
            },
        ])
        .await
        .unwrap(),
        failing_credits: Mutex::new(None),
    });
    let repository = Arc::new(FlakyRepository::default());
    let notifier = Arc::new(notifier);
    let cards = Arc::new(InMemoryCardDirectory::new());
    cards.register(CARD, PAYER).await.unwrap();
    let clock = Arc::new(FixedClock::new(start()));

    let engine = MovementEngine::new(
        repository.clone(),
        ledger.clone(),
        notifier.clone(),
        cards.clone(),
    )
    .with_ids(Arc::new(SequentialIds::default()))
    .with_clock(clock.clone());

    Harness {
        engine,
        ledger,
        repository,
        notifier,
        cards,
        clock,
        client,
    }
}

impl Harness {
    pub fn gym_request(&self) -> CreateDirectDebit {
        CreateDirectDebit {
            client_guid: self.client,
            iban_origen: PAYER.to_string(),
            iban_destino: CREDITOR.to_string(),
            amount: eur(50),
            creditor_name: "Gym".to_string(),
            periodicity: Periodicity::Monthly,
            start_date: start(),
        }
    }

    /// Another engine over the same stores, as a separate process would run it.
    pub fn second_engine(&self) -> MovementEngine {
        MovementEngine::new(
            self.repository.clone(),
            self.ledger.clone(),
            self.notifier.clone(),
            self.cards.clone(),
        )
        .with_clock(self.clock.clone())
    }

    pub async fn balance(&self, iban: &str) -> Decimal {
        self.ledger.balance(iban).await.unwrap()
    }

    pub async fn stored(&self, guid: Uuid) -> Movement {
        self.repository.find_by_guid(guid).await.unwrap().unwrap()
    }

    /// Delivered events, once `count` of them arrived.
    pub async fn events(&self, count: usize) -> Vec<MovementEvent> {
        self.notifier
            .wait_for(count, std::time::Duration::from_secs(5))
            .await
    }
}
