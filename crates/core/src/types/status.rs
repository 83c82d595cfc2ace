//! Status enums mirrored from backend `text`/enum columns.

use serde::{Deserialize, Serialize};

/// Listing lifecycle of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    /// Visible and purchasable.
    Active,
    /// Held by an in-progress checkout.
    Reserved,
    Sold,
    Removed,
}

impl ProductStatus {
    /// Returns `true` if a buyer can pay for a product in this state.
    #[must_use]
    pub const fn is_purchasable(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Wire name used in filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical condition of a listed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCondition {
    New,
    LikeNew,
    Good,
    Fair,
    /// Sold as-is, not working.
    ForParts,
}

impl ProductCondition {
    /// Wire name, e.g. `like_new`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::LikeNew => "like_new",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::ForParts => "for_parts",
        }
    }
}

impl std::fmt::Display for ProductCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "like_new" => Ok(Self::LikeNew),
            "good" => Ok(Self::Good),
            "fair" => Ok(Self::Fair),
            "for_parts" => Ok(Self::ForParts),
            _ => Err(format!("invalid product condition: {s}")),
        }
    }
}

/// Kind of wallet ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Proceeds of a sale credited to the seller (starts pending, in escrow).
    Sale,
    Payout,
    Refund,
    Fee,
    Adjustment,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sale => write!(f, "sale"),
            Self::Payout => write!(f, "payout"),
            Self::Refund => write!(f, "refund"),
            Self::Fee => write!(f, "fee"),
            Self::Adjustment => write!(f, "adjustment"),
        }
    }
}

/// Settlement state of a wallet ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderShipped,
    ItemSold,
    PayoutCompleted,
    PayoutFailed,
    VerificationUpdate,
    /// Anything the client does not know about yet.
    #[serde(other)]
    System,
}

/// Why a user reported a product or another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Fraud,
    Counterfeit,
    Prohibited,
    Offensive,
    Spam,
    Other,
}

impl std::str::FromStr for ReportReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fraud" => Ok(Self::Fraud),
            "counterfeit" => Ok(Self::Counterfeit),
            "prohibited" => Ok(Self::Prohibited),
            "offensive" => Ok(Self::Offensive),
            "spam" => Ok(Self::Spam),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid report reason: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_is_purchasable() {
        assert!(ProductStatus::Active.is_purchasable());
        for status in [
            ProductStatus::Draft,
            ProductStatus::Reserved,
            ProductStatus::Sold,
            ProductStatus::Removed,
        ] {
            assert!(!status.is_purchasable(), "{status} should not be purchasable");
        }
    }

    #[test]
    fn test_condition_wire_names() {
        let json = serde_json::to_string(&ProductCondition::LikeNew).unwrap();
        assert_eq!(json, "\"like_new\"");
        assert_eq!(
            "for_parts".parse::<ProductCondition>().unwrap(),
            ProductCondition::ForParts
        );
    }

    #[test]
    fn test_unknown_notification_kind_falls_back() {
        let kind: NotificationKind = serde_json::from_str("\"promo_blast\"").unwrap();
        assert_eq!(kind, NotificationKind::System);
    }
}
