//! Moderation reports.

use hwmarket_core::{NewReport, ProductId, Report, ReportReason, UserId, ValidationError};
use tracing::instrument;

use crate::backend::{Backend, Table, insert_as};
use crate::error::Result;

const MAX_DETAILS_LENGTH: usize = 1000;

/// Repository for the `reports` table.
pub struct ReportRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> ReportRepository<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Report a listing.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the details are too long.
    #[instrument(skip(self, details))]
    pub async fn report_product(
        &self,
        reporter_id: UserId,
        product_id: ProductId,
        reason: ReportReason,
        details: Option<&str>,
    ) -> Result<Report> {
        let report = NewReport {
            reporter_id,
            product_id: Some(product_id),
            reported_user_id: None,
            reason,
            details: clean_details(details)?,
        };
        insert_as(self.backend, Table::Reports, &report).await
    }

    /// Report another user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` when reporting yourself.
    #[instrument(skip(self, details))]
    pub async fn report_user(
        &self,
        reporter_id: UserId,
        reported_user_id: UserId,
        reason: ReportReason,
        details: Option<&str>,
    ) -> Result<Report> {
        if reporter_id == reported_user_id {
            return Err(ValidationError::Invalid {
                field: "reported_user_id",
                message: "you cannot report yourself".to_string(),
            }
            .into());
        }
        let report = NewReport {
            reporter_id,
            product_id: None,
            reported_user_id: Some(reported_user_id),
            reason,
            details: clean_details(details)?,
        };
        insert_as(self.backend, Table::Reports, &report).await
    }
}

fn clean_details(details: Option<&str>) -> std::result::Result<Option<String>, ValidationError> {
    let details = details.map(str::trim).filter(|d| !d.is_empty());
    match details {
        Some(d) if d.chars().count() > MAX_DETAILS_LENGTH => Err(ValidationError::Length {
            field: "details",
            min: 0,
            max: MAX_DETAILS_LENGTH,
        }),
        other => Ok(other.map(ToString::to_string)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_details() {
        assert_eq!(clean_details(None).unwrap(), None);
        assert_eq!(clean_details(Some("   ")).unwrap(), None);
        assert_eq!(
            clean_details(Some(" fake photos ")).unwrap().as_deref(),
            Some("fake photos")
        );
        assert!(clean_details(Some("x".repeat(1001).as_str())).is_err());
    }
}
