use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::validation::luhn_check_digit;

const BBAN_DIGITS: usize = 20;
const CARD_PREFIX: &str = "4";
const CARD_BODY_DIGITS: usize = 14;

/// Source of identifiers handed out at creation time.
pub trait IdSource: Send + Sync {
    fn movement_guid(&self) -> Uuid;
    fn iban(&self) -> String;
    fn card_number(&self) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn movement_guid(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn iban(&self) -> String {
        spanish_iban(Uuid::new_v4().as_u128())
    }

    fn card_number(&self) -> String {
        visa_card(Uuid::new_v4().as_u128())
    }
}

/// Deterministic ids for tests and fixtures.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl IdSource for SequentialIds {
    fn movement_guid(&self) -> Uuid {
        Uuid::from_u128(u128::from(self.bump()))
    }

    fn iban(&self) -> String {
        spanish_iban(u128::from(self.bump()))
    }

    fn card_number(&self) -> String {
        visa_card(u128::from(self.bump()))
    }
}

pub fn spanish_iban(entropy: u128) -> String {
    let bban = format!("{:0width$}", entropy % 10u128.pow(BBAN_DIGITS as u32), width = BBAN_DIGITS);
    iban_with_check_digits("ES", &bban)
}

/// Computes the ISO 13616 check digits for `country` + `bban`.
pub fn iban_with_check_digits(country: &str, bban: &str) -> String {
    let rearranged = format!("{bban}{country}00");
    let mut remainder: u32 = 0;
    for ch in rearranged.chars() {
        let Some(value) = ch.to_digit(36) else {
            continue;
        };
        remainder = if value < 10 {
            (remainder * 10 + value) % 97
        } else {
            (remainder * 100 + value) % 97
        };
    }
    let check = 98 - remainder;
    format!("{country}{check:02}{bban}")
}

fn visa_card(entropy: u128) -> String {
    let body = format!(
        "{CARD_PREFIX}{:0width$}",
        entropy % 10u128.pow(CARD_BODY_DIGITS as u32),
        width = CARD_BODY_DIGITS
    );
    let check = luhn_check_digit(&body).unwrap_or(0);
    format!("{body}{check}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{is_iban_shaped, luhn_valid};

    #[test]
    fn known_iban_check_digits() {
        assert_eq!(
            iban_with_check_digits("ES", "21000418450200051332"),
            "ES9121000418450200051332"
        );
    }

    #[test]
    fn sequential_ids_are_deterministic() {
        let first = SequentialIds::default();
        let second = SequentialIds::default();

        assert_eq!(first.movement_guid(), second.movement_guid());
        assert_eq!(first.iban(), second.iban());
        assert_eq!(first.card_number(), second.card_number());
    }

    #[test]
    fn generated_numbers_pass_format_checks() {
        let ids = RandomIds;
        for _ in 0..32 {
            let iban = ids.iban();
            assert_eq!(iban.len(), 24);
            assert!(is_iban_shaped(&iban));

            let card = ids.card_number();
            assert_eq!(card.len(), 16);
            assert!(luhn_valid(&card));
        }
    }
}
