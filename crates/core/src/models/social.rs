//! Favorites, reports and blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FavoriteId, ProductId, ReportId, ReportReason, UserId};

/// A product saved by a user (`favorites` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
}

/// A moderation report (`reports` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub reported_user_id: Option<UserId>,
    pub reason: ReportReason,
    #[serde(default)]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a report. Exactly one target should be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewReport {
    pub reporter_id: UserId,
    pub product_id: Option<ProductId>,
    pub reported_user_id: Option<UserId>,
    pub reason: ReportReason,
    pub details: Option<String>,
}

/// A block between two users (`blocked_users` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedUser {
    pub blocker_id: UserId,
    pub blocked_id: UserId,
    pub created_at: DateTime<Utc>,
}
