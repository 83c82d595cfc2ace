//! Notification inbox.

use hwmarket_core::{Notification, NotificationId, UserId};
use serde_json::json;
use tracing::instrument;

use crate::backend::{Backend, Direction, Query, Table, fetch_all};
use crate::error::Result;

/// Repository for the `notifications` table.
pub struct NotificationRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Newest notifications first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>> {
        let query = Query::table(Table::Notifications)
            .eq("user_id", user_id)
            .order("created_at", Direction::Desc)
            .limit(limit);
        fetch_all(self.backend, &query).await
    }

    /// Number of unread notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<usize> {
        let query = Query::table(Table::Notifications)
            .columns("id")
            .eq("user_id", user_id)
            .eq("read", false);
        Ok(self.backend.select(&query).await?.len())
    }

    /// Mark one notification read.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let query = Query::table(Table::Notifications).eq("id", id);
        self.backend.update(&query, json!({ "read": true })).await?;
        Ok(())
    }

    /// Mark every unread notification read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<usize> {
        let query = Query::table(Table::Notifications)
            .eq("user_id", user_id)
            .eq("read", false);
        let updated = self.backend.update(&query, json!({ "read": true })).await?;
        Ok(updated.len())
    }
}
