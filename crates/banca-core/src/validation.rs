use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BankError;

const IBAN_MIN_LEN: usize = 15;
const IBAN_MAX_LEN: usize = 34;
const CARD_MIN_LEN: usize = 13;
const CARD_MAX_LEN: usize = 19;

/// Every violation found in a request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, reason: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, reason);
        errors
    }

    pub fn add(&mut self, field: &str, reason: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn reasons(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), BankError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BankError::ValidationFailed(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, reasons) in &self.0 {
            for reason in reasons {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {reason}")?;
                first = false;
            }
        }
        Ok(())
    }
}

pub fn require_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "is required");
    }
}

/// Ledger operations accept zero but never a negative amount.
pub fn ensure_non_negative(amount: Decimal) -> Result<(), BankError> {
    if amount < Decimal::ZERO {
        return Err(BankError::ValidationFailed(FieldErrors::single(
            "amount",
            "must not be negative",
        )));
    }
    Ok(())
}

pub fn require_positive_amount(errors: &mut FieldErrors, field: &str, amount: Decimal) {
    if amount <= Decimal::ZERO {
        errors.add(field, "must be greater than zero");
    }
}

/// Checks the IBAN layout: country code, two check digits, alphanumeric BBAN.
pub fn check_iban(errors: &mut FieldErrors, field: &str, iban: &str) {
    if iban.trim().is_empty() {
        errors.add(field, "is required");
        return;
    }
    if !is_iban_shaped(iban) {
        errors.add(field, "is not a valid IBAN");
    }
}

pub fn is_iban_shaped(iban: &str) -> bool {
    let bytes = iban.as_bytes();
    (IBAN_MIN_LEN..=IBAN_MAX_LEN).contains(&bytes.len())
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes[4..]
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

pub fn check_card_number(errors: &mut FieldErrors, field: &str, card_number: &str) {
    if card_number.trim().is_empty() {
        errors.add(field, "is required");
        return;
    }
    let shaped = (CARD_MIN_LEN..=CARD_MAX_LEN).contains(&card_number.len())
        && card_number.bytes().all(|b| b.is_ascii_digit());
    if !shaped || !luhn_valid(card_number) {
        errors.add(field, "is not a valid card number");
    }
}

pub fn luhn_valid(digits: &str) -> bool {
    luhn_sum(digits, false).is_some_and(|sum| sum % 10 == 0)
}

/// Digit that makes `digits` followed by it pass the Luhn check.
pub fn luhn_check_digit(digits: &str) -> Option<u32> {
    luhn_sum(digits, true).map(|sum| (10 - sum % 10) % 10)
}

fn luhn_sum(digits: &str, double_first: bool) -> Option<u32> {
    let mut sum = 0;
    let mut double = double_first;
    for ch in digits.chars().rev() {
        let mut digit = ch.to_digit(10)?;
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }
    Some(sum)
}

/// Last four digits of a card number, for logs and error messages.
pub fn mask_card(card_number: &str) -> String {
    let tail: String = card_number
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ES7620770024003102575766", true)]
    #[case("DE89370400440532013000", true)]
    #[case("es7620770024003102575766", false)]
    #[case("ESXX20770024003102575766", false)]
    #[case("ES76", false)]
    #[case("ES76 2077 0024 0031 0257 5766", false)]
    fn iban_shape(#[case] iban: &str, #[case] expected: bool) {
        assert_eq!(is_iban_shaped(iban), expected);
    }

    #[rstest]
    #[case("4111111111111111", true)]
    #[case("4111111111111112", false)]
    #[case("41111111", false)]
    #[case("4111-1111-1111-1111", false)]
    fn card_numbers(#[case] card: &str, #[case] valid: bool) {
        let mut errors = FieldErrors::new();
        check_card_number(&mut errors, "cardNumber", card);
        assert_eq!(errors.is_empty(), valid);
    }

    #[test]
    fn check_digit_completes_a_valid_number() {
        let digit = luhn_check_digit("411111111111111").unwrap();
        assert_eq!(digit, 1);
    }

    #[test]
    fn collects_every_violation_before_failing() {
        let mut errors = FieldErrors::new();
        require_positive_amount(&mut errors, "amount", Decimal::ZERO);
        check_iban(&mut errors, "ibanOrigen", "nope");
        require_text(&mut errors, "creditorName", "  ");

        assert_eq!(errors.len(), 3);
        let err = errors.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("amount: must be greater than zero"));
        assert!(message.contains("creditorName: is required"));
    }

    #[test]
    fn masks_all_but_last_four_digits() {
        assert_eq!(mask_card("4111111111111111"), "****1111");
    }
}
