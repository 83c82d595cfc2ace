//! Seller wallets, their ledger, and payout bank accounts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    BankAccountId, CurrencyCode, TransactionId, TransactionKind, TransactionStatus, UserId,
    WalletId,
};

/// A seller's balance row (`wallets` table).
///
/// `pending_balance` is money held in escrow until the buyer confirms
/// delivery; `available_balance` can be paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    #[serde(default)]
    pub currency: CurrencyCode,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Available plus escrowed funds.
    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.available_balance + self.pending_balance
    }
}

/// One ledger entry (`wallet_transactions` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Signed amount: credits positive, debits negative.
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    /// Order or payout this entry belongs to.
    #[serde(default)]
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A payout destination (`seller_bank_accounts` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerBankAccount {
    pub id: BankAccountId,
    pub user_id: UserId,
    pub clabe: String,
    pub bank_name: String,
    pub account_holder: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl SellerBankAccount {
    /// CLABE with everything but the last four digits hidden.
    #[must_use]
    pub fn masked_clabe(&self) -> String {
        let visible = self.clabe.len().saturating_sub(4);
        let tail = self.clabe.get(visible..).unwrap_or_default();
        format!("{}{tail}", "•".repeat(visible))
    }
}

/// Insert payload for a bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBankAccount {
    pub user_id: UserId,
    pub clabe: String,
    pub bank_name: String,
    pub account_holder: String,
    pub is_default: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_accepts_numeric_and_string_balances() {
        let json = serde_json::json!({
            "id": "3a0f9a52-0c36-4c8f-9b0e-0d6a4c2b9e71",
            "user_id": "0b7d7c1e-3f6d-4a7a-8f42-2d51f7c0e9b3",
            "available_balance": 1500.5,
            "pending_balance": "250.00"
        });
        let wallet: Wallet = serde_json::from_value(json).unwrap();
        assert_eq!(wallet.available_balance, Decimal::new(15005, 1));
        assert_eq!(wallet.pending_balance, Decimal::new(25000, 2));
        assert_eq!(wallet.total_balance(), Decimal::new(175_050, 2));
        assert_eq!(wallet.currency, CurrencyCode::MXN);
    }

    #[test]
    fn test_transaction_kind_uses_type_column() {
        let json = serde_json::json!({
            "id": "9d1e7a0c-52b4-4d3e-8c1f-6a2b3c4d5e6f",
            "wallet_id": "3a0f9a52-0c36-4c8f-9b0e-0d6a4c2b9e71",
            "type": "payout",
            "status": "pending",
            "amount": -500,
            "created_at": "2024-05-01T10:00:00Z"
        });
        let tx: WalletTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx.kind, TransactionKind::Payout);
        assert_eq!(tx.amount, Decimal::new(-500, 0));
    }

    #[test]
    fn test_masked_clabe() {
        let account = SellerBankAccount {
            id: BankAccountId::random(),
            user_id: UserId::random(),
            clabe: "072180001234567897".to_string(),
            bank_name: "BANORTE".to_string(),
            account_holder: "Ana López".to_string(),
            is_default: true,
            created_at: Utc::now(),
        };
        assert_eq!(account.masked_clabe(), format!("{}7897", "•".repeat(14)));
    }
}
