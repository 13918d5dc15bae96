use banca_core::{
    BankError, BankResult, CreateDirectDebit, DirectDebit, Movement, MovementPayload,
    OperationType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{MovementEngine, SAVE_ATTEMPTS, movement_key, within_revocation_window};

/// Result of a single execution attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed {
        movement: Movement,
        origin_balance: Decimal,
    },
    /// Already executed for the current period, or the start date is still ahead.
    NotDue {
        next_due_at: Option<DateTime<Utc>>,
    },
    /// Debit skipped; the direct debit stays active for the next cycle.
    InsufficientFunds { iban: String, balance: Decimal },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueRunReport {
    pub as_of: Option<DateTime<Utc>>,
    pub executed: Vec<Uuid>,
    pub not_due: Vec<Uuid>,
    pub insufficient_funds: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
}

enum Claim {
    Won {
        movement: Movement,
        previous: Option<DateTime<Utc>>,
    },
    NotDue {
        next_due_at: Option<DateTime<Utc>>,
    },
}

fn creditor_key(iban: &str, creditor_name: &str) -> String {
    format!("direct-debit:{iban}:{creditor_name}")
}

impl MovementEngine {
    pub async fn create_direct_debit(&self, request: CreateDirectDebit) -> BankResult<Movement> {
        let request = request.normalized();
        request.validate()?;
        if !self.ledger.contains(&request.iban_origen).await? {
            return Err(BankError::UnknownIban(request.iban_origen));
        }

        let _guard = self
            .locks
            .lock(creditor_key(&request.iban_origen, &request.creditor_name))
            .await;
        if self
            .repository
            .find_active_by_origin_and_creditor(&request.iban_origen, &request.creditor_name)
            .await?
            .is_some()
        {
            return Err(BankError::DuplicatedDirectDebit {
                iban: request.iban_origen,
                creditor: request.creditor_name,
            });
        }

        let movement = self
            .new_movement(request.client_guid, |guid| {
                MovementPayload::DirectDebit(DirectDebit {
                    guid,
                    iban_origen: request.iban_origen,
                    iban_destino: request.iban_destino,
                    amount: request.amount,
                    creditor_name: request.creditor_name,
                    start_date: request.start_date,
                    periodicity: request.periodicity,
                    active: true,
                    last_executed_at: None,
                })
            })
            .await?;

        let saved = self.repository.save(movement).await?;
        info!(movement = %saved.guid(), "direct debit created");
        self.announce(OperationType::Create, &saved);
        Ok(saved)
    }

    /// Charges the direct debit if a period is due at `as_of`.
    ///
    /// The period is claimed first by saving `last_executed_at` against the version that was
    /// read. A trigger that loses the claim to another process reads the movement again and
    /// returns [`ExecutionOutcome::NotDue`] instead of debiting a second time. If the debit then
    /// fails the claim is released.
    pub async fn execute_direct_debit(
        &self,
        guid: Uuid,
        as_of: DateTime<Utc>,
    ) -> BankResult<ExecutionOutcome> {
        let _guard = self.locks.lock(movement_key(guid)).await;
        let (claimed, previous) = match self.claim_period(guid, as_of).await? {
            Claim::Won { movement, previous } => (movement, previous),
            Claim::NotDue { next_due_at } => return Ok(ExecutionOutcome::NotDue { next_due_at }),
        };
        let debit = claimed.direct_debit().ok_or(BankError::NotFound(guid))?;
        let origin = debit.iban_origen.clone();
        let destination = debit.iban_destino.clone();
        let amount = debit.amount;

        let origin_balance = match self.ledger.debit(&origin, amount).await {
            Ok(balance) => balance,
            Err(err) => {
                self.release_period(guid, as_of, previous).await;
                return match err {
                    BankError::InsufficientFunds { iban, balance } => {
                        info!(movement = %guid, %iban, %balance, "direct debit skipped for insufficient funds");
                        Ok(ExecutionOutcome::InsufficientFunds { iban, balance })
                    }
                    err => Err(err),
                };
            }
        };

        if let Err(err) = self.credit_if_internal(&destination, amount).await {
            self.compensate(&origin, None, amount).await;
            self.release_period(guid, as_of, previous).await;
            return Err(err);
        }

        info!(movement = %guid, %amount, "direct debit executed");
        self.announce(OperationType::Update, &claimed);
        Ok(ExecutionOutcome::Executed {
            movement: claimed,
            origin_balance,
        })
    }

    async fn claim_period(&self, guid: Uuid, as_of: DateTime<Utc>) -> BankResult<Claim> {
        for _ in 0..SAVE_ATTEMPTS {
            let mut movement = self.find_movement(guid).await?;
            let debit = movement
                .direct_debit_mut()
                .ok_or(BankError::NotFound(guid))?;
            if !debit.active {
                return Err(BankError::NotActive(guid));
            }
            if !debit.is_due(as_of) {
                return Ok(Claim::NotDue {
                    next_due_at: debit.next_due_at(),
                });
            }
            let previous = debit.last_executed_at.replace(as_of);

            match self.repository.save(movement).await.map_err(BankError::from) {
                Ok(movement) => return Ok(Claim::Won { movement, previous }),
                Err(BankError::Conflict(_)) => {
                    debug!(movement = %guid, "direct debit claimed elsewhere, reading it again");
                }
                Err(err) => return Err(err),
            }
        }
        Err(BankError::Conflict(guid))
    }

    /// Puts `last_executed_at` back after a claimed execution could not be charged.
    async fn release_period(
        &self,
        guid: Uuid,
        as_of: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) {
        let released = self
            .update_movement(guid, |movement| {
                if let Some(debit) = movement.direct_debit_mut() {
                    if debit.last_executed_at == Some(as_of) {
                        debit.last_executed_at = previous;
                    }
                }
                Ok(())
            })
            .await;
        if let Err(err) = released {
            error!(movement = %guid, %as_of, "claimed period not released: {err:#}");
        }
    }

    /// Deactivates a direct debit created less than 24 hours before `request_time`. Charges
    /// already made stay in place.
    pub async fn revoke_direct_debit(
        &self,
        guid: Uuid,
        request_time: DateTime<Utc>,
    ) -> BankResult<Movement> {
        let _guard = self.locks.lock(movement_key(guid)).await;
        let saved = self
            .update_movement(guid, |movement| {
                let created_at = movement.created_at();
                let debit = movement
                    .direct_debit_mut()
                    .filter(|debit| debit.active)
                    .ok_or(BankError::NotRevocable(guid))?;
                if !within_revocation_window(created_at, request_time) {
                    return Err(BankError::RevocationWindowExpired(guid));
                }
                debit.active = false;
                Ok(())
            })
            .await?;
        info!(movement = %guid, "direct debit revoked");
        self.announce(OperationType::Update, &saved);
        Ok(saved)
    }

    /// Executes every active direct debit that is due at `as_of`.
    pub async fn run_due(&self, as_of: DateTime<Utc>) -> BankResult<DueRunReport> {
        let active = self.repository.find_active_direct_debits().await?;
        let mut report = DueRunReport {
            as_of: Some(as_of),
            ..DueRunReport::default()
        };

        for movement in active {
            let guid = movement.guid();
            match self.execute_direct_debit(guid, as_of).await {
                Ok(ExecutionOutcome::Executed { .. }) => report.executed.push(guid),
                Ok(ExecutionOutcome::NotDue { .. }) => report.not_due.push(guid),
                Ok(ExecutionOutcome::InsufficientFunds { .. }) => {
                    report.insufficient_funds.push(guid)
                }
                Err(err) if err.is_client_error() => {
                    warn!(movement = %guid, "direct debit not executed: {err}");
                    report.failed.push((guid, err.to_string()));
                }
                Err(err) => {
                    error!(movement = %guid, "direct debit execution failed: {err:#}");
                    report.failed.push((guid, err.to_string()));
                }
            }
        }

        info!(
            executed = report.executed.len(),
            not_due = report.not_due.len(),
            insufficient_funds = report.insufficient_funds.len(),
            failed = report.failed.len(),
            "due direct debits processed"
        );
        Ok(report)
    }
}
