//! In-app notifications (`notifications` table).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NotificationId, NotificationKind, UserId};

/// A notification shown in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    /// Free-form payload (order id, product id, ...).
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
