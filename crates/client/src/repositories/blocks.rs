//! User blocks.

use hwmarket_core::{BlockedUser, UserId, ValidationError};
use serde_json::json;
use tracing::instrument;

use crate::backend::{Backend, Direction, Query, Table, fetch_all};
use crate::error::Result;

/// Repository for the `blocked_users` table.
pub struct BlockRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> BlockRepository<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Users blocked by `blocker_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, blocker_id: UserId) -> Result<Vec<BlockedUser>> {
        let query = Query::table(Table::BlockedUsers)
            .eq("blocker_id", blocker_id)
            .order("created_at", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Returns `true` if either user blocked the other.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn is_blocked_between(&self, a: UserId, b: UserId) -> Result<bool> {
        for (blocker, blocked) in [(a, b), (b, a)] {
            let query = Query::table(Table::BlockedUsers)
                .eq("blocker_id", blocker)
                .eq("blocked_id", blocked)
                .limit(1);
            if !self.backend.select(&query).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Block a user. Blocking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` when blocking yourself.
    #[instrument(skip(self))]
    pub async fn block(&self, blocker_id: UserId, blocked_id: UserId) -> Result<()> {
        if blocker_id == blocked_id {
            return Err(ValidationError::Invalid {
                field: "blocked_id",
                message: "you cannot block yourself".to_string(),
            }
            .into());
        }
        let existing = Query::table(Table::BlockedUsers)
            .eq("blocker_id", blocker_id)
            .eq("blocked_id", blocked_id);
        if self.backend.select(&existing).await?.is_empty() {
            self.backend
                .insert(
                    Table::BlockedUsers,
                    json!({ "blocker_id": blocker_id, "blocked_id": blocked_id }),
                )
                .await?;
        }
        Ok(())
    }

    /// Remove a block.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn unblock(&self, blocker_id: UserId, blocked_id: UserId) -> Result<()> {
        let query = Query::table(Table::BlockedUsers)
            .eq("blocker_id", blocker_id)
            .eq("blocked_id", blocked_id);
        self.backend.delete(&query).await
    }
}
