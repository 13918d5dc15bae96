use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BankResult;
use crate::models::Periodicity;
use crate::validation::{
    FieldErrors, check_card_number, check_iban, require_positive_amount, require_text,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectDebit {
    pub client_guid: Uuid,
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub creditor_name: String,
    pub periodicity: Periodicity,
    pub start_date: DateTime<Utc>,
}

impl CreateDirectDebit {
    /// Trims the creditor name so it matches stored direct debits regardless of padding.
    pub fn normalized(mut self) -> Self {
        self.creditor_name = self.creditor_name.trim().to_string();
        self
    }

    pub fn validate(&self) -> BankResult<()> {
        let mut errors = FieldErrors::new();
        check_iban(&mut errors, "ibanOrigen", &self.iban_origen);
        check_iban(&mut errors, "ibanDestino", &self.iban_destino);
        if !self.iban_origen.is_empty() && self.iban_origen == self.iban_destino {
            errors.add("ibanDestino", "must differ from ibanOrigen");
        }
        require_positive_amount(&mut errors, "amount", self.amount);
        require_text(&mut errors, "creditorName", &self.creditor_name);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransfer {
    pub client_guid: Uuid,
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub beneficiary_name: String,
}

impl CreateTransfer {
    pub fn validate(&self) -> BankResult<()> {
        let mut errors = FieldErrors::new();
        check_iban(&mut errors, "ibanOrigen", &self.iban_origen);
        check_iban(&mut errors, "ibanDestino", &self.iban_destino);
        if !self.iban_origen.is_empty() && self.iban_origen == self.iban_destino {
            errors.add("ibanDestino", "must differ from ibanOrigen");
        }
        require_positive_amount(&mut errors, "amount", self.amount);
        require_text(&mut errors, "beneficiaryName", &self.beneficiary_name);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayrollIncome {
    pub client_guid: Uuid,
    pub iban_origen: String,
    pub iban_destino: String,
    pub amount: Decimal,
    pub company_name: String,
    pub company_tax_id: String,
}

impl CreatePayrollIncome {
    pub fn validate(&self) -> BankResult<()> {
        let mut errors = FieldErrors::new();
        check_iban(&mut errors, "ibanOrigen", &self.iban_origen);
        check_iban(&mut errors, "ibanDestino", &self.iban_destino);
        require_positive_amount(&mut errors, "amount", self.amount);
        require_text(&mut errors, "companyName", &self.company_name);
        require_text(&mut errors, "companyTaxId", &self.company_tax_id);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardPayment {
    pub client_guid: Uuid,
    pub card_number: String,
    pub amount: Decimal,
    pub merchant_name: String,
}

impl CreateCardPayment {
    pub fn validate(&self) -> BankResult<()> {
        let mut errors = FieldErrors::new();
        check_card_number(&mut errors, "cardNumber", &self.card_number);
        require_positive_amount(&mut errors, "amount", self.amount);
        require_text(&mut errors, "merchantName", &self.merchant_name);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccount {
    pub client_guid: Uuid,
    #[serde(default)]
    pub initial_balance: Decimal,
}

impl OpenAccount {
    pub fn validate(&self) -> BankResult<()> {
        let mut errors = FieldErrors::new();
        if self.initial_balance < Decimal::ZERO {
            errors.add("initialBalance", "must not be negative");
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::error::BankError;

    fn direct_debit() -> CreateDirectDebit {
        CreateDirectDebit {
            client_guid: Uuid::nil(),
            iban_origen: "ES7620770024003102575766".to_string(),
            iban_destino: "ES9121000418450200051332".to_string(),
            amount: Decimal::new(50, 0),
            creditor_name: "Gym".to_string(),
            periodicity: Periodicity::Monthly,
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn well_formed_direct_debit_passes() {
        assert!(direct_debit().validate().is_ok());
    }

    #[test]
    fn direct_debit_reports_all_field_errors() {
        let request = CreateDirectDebit {
            iban_origen: "bad".to_string(),
            amount: Decimal::new(-5, 0),
            creditor_name: String::new(),
            ..direct_debit()
        };
        let Err(BankError::ValidationFailed(fields)) = request.validate() else {
            panic!("expected validation failure");
        };
        let names: Vec<_> = fields.fields().collect();
        assert_eq!(names, vec!["amount", "creditorName", "ibanOrigen"]);
    }

    #[test]
    fn transfer_to_same_account_is_rejected() {
        let request = CreateTransfer {
            client_guid: Uuid::nil(),
            iban_origen: "ES9121000418450200051332".to_string(),
            iban_destino: "ES9121000418450200051332".to_string(),
            amount: Decimal::ONE,
            beneficiary_name: "Self".to_string(),
        };
        let Err(BankError::ValidationFailed(fields)) = request.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(fields.reasons("ibanDestino").len(), 1);
    }

    #[test]
    fn payroll_requires_tax_id() {
        let request = CreatePayrollIncome {
            client_guid: Uuid::nil(),
            iban_origen: "ES7620770024003102575766".to_string(),
            iban_destino: "ES9121000418450200051332".to_string(),
            amount: Decimal::new(2000, 0),
            company_name: "Acme".to_string(),
            company_tax_id: " ".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(BankError::ValidationFailed(_))
        ));
    }

    #[test]
    fn creditor_name_padding_is_trimmed() {
        let request = CreateDirectDebit {
            creditor_name: "  Gym ".to_string(),
            ..direct_debit()
        }
        .normalized();
        assert_eq!(request.creditor_name, "Gym");
    }

    #[test]
    fn account_cannot_open_overdrawn() {
        let request = OpenAccount {
            client_guid: Uuid::nil(),
            initial_balance: Decimal::NEGATIVE_ONE,
        };
        assert!(request.validate().is_err());
        assert!(
            OpenAccount {
                client_guid: Uuid::nil(),
                initial_balance: Decimal::ZERO,
            }
            .validate()
            .is_ok()
        );
    }
}
