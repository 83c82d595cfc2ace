//! Shipping addresses (`addresses` table).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AddressId, UserId};

fn default_country() -> String {
    "MX".to_string()
}

/// A saved shipping address.
///
/// The backend keeps at most one `is_default` row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    #[serde(default)]
    pub label: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub exterior_number: String,
    #[serde(default)]
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Single-line rendering for confirmations and logs.
    #[must_use]
    pub fn one_line(&self) -> String {
        let interior = self
            .interior_number
            .as_deref()
            .map(|n| format!(" Int. {n}"))
            .unwrap_or_default();
        format!(
            "{} {}{interior}, {}, {}, {} {}",
            self.street, self.exterior_number, self.neighborhood, self.city, self.state, self.postal_code
        )
    }
}

/// Insert payload for a new address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub user_id: UserId,
    pub label: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub exterior_number: String,
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update for an address. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exterior_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interior_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}
