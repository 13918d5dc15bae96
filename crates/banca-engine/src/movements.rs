use banca_core::validation::mask_card;
use banca_core::{
    BankError, BankResult, CardPayment, CreateCardPayment, CreatePayrollIncome, CreateTransfer,
    Movement, MovementPayload, OperationType, PayrollIncome, Transfer,
};
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::{MovementEngine, movement_key, within_revocation_window};

impl MovementEngine {
    /// Moves funds out of one of our accounts. Destinations outside the bank are only debited
    /// on our side.
    pub async fn create_transfer(&self, request: CreateTransfer) -> BankResult<Movement> {
        request.validate()?;
        if !self.ledger.contains(&request.iban_origen).await? {
            return Err(BankError::UnknownIban(request.iban_origen));
        }

        self.ledger
            .debit(&request.iban_origen, request.amount)
            .await?;
        let credited = match self
            .credit_if_internal(&request.iban_destino, request.amount)
            .await
        {
            Ok(credited) => credited,
            Err(err) => {
                self.compensate(&request.iban_origen, None, request.amount).await;
                return Err(err);
            }
        };

        let transfer = Transfer {
            iban_origen: request.iban_origen,
            iban_destino: request.iban_destino,
            amount: request.amount,
            beneficiary_name: request.beneficiary_name,
        };
        let saved = match self
            .persist_new(request.client_guid, MovementPayload::Transfer(transfer.clone()))
            .await
        {
            Ok(saved) => saved,
            Err(err) => {
                let credited_to = credited.then_some(transfer.iban_destino.as_str());
                self.compensate(&transfer.iban_origen, credited_to, transfer.amount)
                    .await;
                return Err(err);
            }
        };

        info!(movement = %saved.guid(), internal = credited, "transfer created");
        self.announce(OperationType::Create, &saved);
        Ok(saved)
    }

    /// Undoes a transfer made less than 24 hours before `request_time` and hides it.
    ///
    /// The transfer is hidden before any money moves, so a second revocation finds nothing to
    /// undo. If the funds cannot be moved back it is brought back as it was.
    pub async fn revoke_transfer(
        &self,
        guid: Uuid,
        request_time: DateTime<Utc>,
    ) -> BankResult<Movement> {
        let _guard = self.locks.lock(movement_key(guid)).await;
        let revoked = self
            .update_movement(guid, |movement| {
                if movement.transfer().is_none() {
                    return Err(BankError::NotRevocable(guid));
                }
                if !within_revocation_window(movement.created_at(), request_time) {
                    return Err(BankError::RevocationWindowExpired(guid));
                }
                movement.soft_delete();
                Ok(())
            })
            .await?;
        let transfer = revoked
            .transfer()
            .cloned()
            .ok_or(BankError::NotRevocable(guid))?;

        if let Err(err) = self.return_funds(&transfer).await {
            self.restore_movement(guid).await;
            return Err(err);
        }

        info!(movement = %guid, "transfer revoked");
        self.announce(OperationType::Delete, &revoked);
        Ok(revoked)
    }

    async fn return_funds(&self, transfer: &Transfer) -> BankResult<()> {
        let internal = self.ledger.contains(&transfer.iban_destino).await?;
        if internal {
            self.ledger
                .debit(&transfer.iban_destino, transfer.amount)
                .await?;
        }
        if let Err(err) = self
            .ledger
            .credit(&transfer.iban_origen, transfer.amount)
            .await
        {
            if internal {
                if let Err(undo) = self
                    .ledger
                    .credit(&transfer.iban_destino, transfer.amount)
                    .await
                {
                    error!(
                        iban = %transfer.iban_destino,
                        amount = %transfer.amount,
                        "compensating credit failed: {undo}"
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Salary paid into one of our accounts by an external company.
    pub async fn create_payroll_income(
        &self,
        request: CreatePayrollIncome,
    ) -> BankResult<Movement> {
        request.validate()?;
        if !self.ledger.contains(&request.iban_destino).await? {
            return Err(BankError::UnknownIban(request.iban_destino));
        }

        self.ledger
            .credit(&request.iban_destino, request.amount)
            .await?;

        let destination = request.iban_destino.clone();
        let amount = request.amount;
        let income = PayrollIncome {
            iban_origen: request.iban_origen,
            iban_destino: request.iban_destino,
            amount: request.amount,
            company_name: request.company_name,
            company_tax_id: request.company_tax_id,
        };
        let saved = match self
            .persist_new(request.client_guid, MovementPayload::PayrollIncome(income))
            .await
        {
            Ok(saved) => saved,
            Err(err) => {
                if let Err(undo) = self.ledger.debit(&destination, amount).await {
                    error!(iban = %destination, %amount, "payroll credit not undone: {undo}");
                }
                return Err(err);
            }
        };

        info!(movement = %saved.guid(), "payroll income recorded");
        self.announce(OperationType::Create, &saved);
        Ok(saved)
    }

    pub async fn create_card_payment(&self, request: CreateCardPayment) -> BankResult<Movement> {
        request.validate()?;
        let iban = self
            .cards
            .account_for_card(&request.card_number)
            .await?
            .ok_or_else(|| BankError::UnknownCard(mask_card(&request.card_number)))?;

        self.ledger.debit(&iban, request.amount).await?;

        let amount = request.amount;
        let payment = CardPayment {
            card_number: request.card_number,
            amount: request.amount,
            merchant_name: request.merchant_name,
        };
        let saved = match self
            .persist_new(request.client_guid, MovementPayload::CardPayment(payment))
            .await
        {
            Ok(saved) => saved,
            Err(err) => {
                self.compensate(&iban, None, amount).await;
                return Err(err);
            }
        };

        info!(movement = %saved.guid(), "card payment recorded");
        self.announce(OperationType::Create, &saved);
        Ok(saved)
    }
}
