use banca_core::validation::mask_card;
use banca_core::{Account, BankError, BankResult, Card, OpenAccount};
use tracing::{info, warn};

use crate::MovementEngine;

/// Fresh identifiers to draw before assuming the id source is exhausted.
const ISSUE_ATTEMPTS: usize = 8;

impl MovementEngine {
    /// Opens an account under a newly issued IBAN.
    pub async fn open_account(&self, request: OpenAccount) -> BankResult<Account> {
        request.validate()?;
        for _ in 0..ISSUE_ATTEMPTS {
            let iban = self.ids.iban();
            if self.ledger.contains(&iban).await? {
                warn!(%iban, "issued iban already in use, drawing another");
                continue;
            }
            let account = Account {
                iban,
                client_guid: request.client_guid,
                balance: request.initial_balance,
            };
            self.ledger.open(account.clone()).await?;
            info!(iban = %account.iban, client = %account.client_guid, "account opened");
            return Ok(account);
        }
        Err(anyhow::anyhow!("no unused iban after {ISSUE_ATTEMPTS} attempts").into())
    }

    /// Issues a new card charging `iban`.
    pub async fn issue_card(&self, iban: &str) -> BankResult<Card> {
        if !self.ledger.contains(iban).await? {
            return Err(BankError::UnknownIban(iban.to_string()));
        }
        for _ in 0..ISSUE_ATTEMPTS {
            let card_number = self.ids.card_number();
            if self.cards.account_for_card(&card_number).await?.is_some() {
                warn!(card = %mask_card(&card_number), "issued card number already in use");
                continue;
            }
            self.cards.register(&card_number, iban).await?;
            info!(card = %mask_card(&card_number), %iban, "card issued");
            return Ok(Card {
                card_number,
                iban: iban.to_string(),
            });
        }
        Err(anyhow::anyhow!("no unused card number after {ISSUE_ATTEMPTS} attempts").into())
    }
}
