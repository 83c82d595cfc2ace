//! Synchronous form validation.
//!
//! These checks run before any request is made. The backend enforces its
//! own rules again; failing here only saves a round trip.

use rust_decimal::Decimal;

use crate::clabe::{Clabe, ClabeError};
use crate::models::NewAddress;
use crate::types::{Price, has_cent_precision};

/// Title length bounds for listings.
pub const TITLE_LENGTH: (usize, usize) = (5, 100);
/// Maximum description length for listings.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;
/// Maximum number of photos per listing.
pub const MAX_IMAGES: usize = 8;

/// A client-side validation failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is blank.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// A text field is too short or too long.
    #[error("{field} must be between {min} and {max} characters")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
    },

    /// A field has the wrong shape.
    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    /// The CLABE failed to parse.
    #[error("invalid CLABE: {0}")]
    Clabe(#[from] ClabeError),

    /// The CLABE is well formed but its bank is not supported.
    #[error("unsupported bank code {0}")]
    UnknownBank(String),

    /// Amount is zero or negative.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// Amount has fractions of a cent.
    #[error("amount may have at most two decimal places")]
    TooPrecise,

    /// Payout below the configured minimum.
    #[error("minimum payout is {}", display_mxn(.0))]
    BelowMinimum(Decimal),

    /// Payout above what can be withdrawn.
    #[error("amount exceeds available balance of {}", display_mxn(.0))]
    InsufficientBalance(Decimal),
}

/// Validate a payout amount against the displayed balance.
///
/// # Errors
///
/// Returns the first rule the amount breaks.
pub fn validate_payout_amount(
    amount: Decimal,
    available: Decimal,
    minimum: Decimal,
) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    if !has_cent_precision(amount) {
        return Err(ValidationError::TooPrecise);
    }
    if amount < minimum {
        return Err(ValidationError::BelowMinimum(minimum));
    }
    if amount > available {
        return Err(ValidationError::InsufficientBalance(available));
    }
    Ok(())
}

/// A bank account form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBankAccount {
    pub clabe: Clabe,
    pub bank_name: &'static str,
    pub account_holder: String,
}

/// Validate the bank-account registration form.
///
/// # Errors
///
/// Returns an error if the holder name is blank, the CLABE is invalid, or
/// the bank prefix is unknown.
pub fn validate_bank_account(
    clabe: &str,
    account_holder: &str,
) -> Result<ValidBankAccount, ValidationError> {
    let account_holder = required("account_holder", account_holder)?;
    check_length("account_holder", &account_holder, 3, 120)?;

    let clabe = Clabe::parse(clabe)?;
    let bank_name = clabe
        .bank_name()
        .ok_or_else(|| ValidationError::UnknownBank(clabe.bank_code().to_string()))?;

    Ok(ValidBankAccount {
        clabe,
        bank_name,
        account_holder,
    })
}

/// Validate a Mexican postal code (five digits).
///
/// # Errors
///
/// Returns an error if the code is not exactly five ASCII digits.
pub fn validate_postal_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field: "postal_code",
            message: "must be 5 digits".to_string(),
        })
    }
}

/// Validate a ten-digit phone number. Spaces, dashes and a `+52` prefix are
/// tolerated.
///
/// # Errors
///
/// Returns an error if ten digits do not remain after stripping.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let trimmed = phone.trim();
    let national = trimmed.strip_prefix("+52").unwrap_or(trimmed);
    let digits: String = national
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if digits.len() == 10 && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field: "phone",
            message: "must be a 10-digit number".to_string(),
        })
    }
}

/// Validate a new shipping address.
///
/// # Errors
///
/// Returns the first invalid field.
pub fn validate_address(address: &NewAddress) -> Result<(), ValidationError> {
    required("recipient_name", &address.recipient_name)?;
    validate_phone(&address.phone)?;
    required("street", &address.street)?;
    required("exterior_number", &address.exterior_number)?;
    required("neighborhood", &address.neighborhood)?;
    required("city", &address.city)?;
    required("state", &address.state)?;
    validate_postal_code(&address.postal_code)
}

/// Validate the core fields of a listing.
///
/// # Errors
///
/// Returns the first invalid field.
pub fn validate_listing(
    title: &str,
    description: Option<&str>,
    price: Decimal,
    image_count: usize,
) -> Result<(), ValidationError> {
    let title = required("title", title)?;
    check_length("title", &title, TITLE_LENGTH.0, TITLE_LENGTH.1)?;

    if let Some(description) = description
        && description.chars().count() > MAX_DESCRIPTION_LENGTH
    {
        return Err(ValidationError::Length {
            field: "description",
            min: 0,
            max: MAX_DESCRIPTION_LENGTH,
        });
    }

    if price <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    if !has_cent_precision(price) {
        return Err(ValidationError::TooPrecise);
    }

    if image_count == 0 {
        return Err(ValidationError::Required { field: "images" });
    }
    if image_count > MAX_IMAGES {
        return Err(ValidationError::Invalid {
            field: "images",
            message: format!("at most {MAX_IMAGES} photos"),
        });
    }

    Ok(())
}

fn display_mxn(amount: &Decimal) -> String {
    Price::mxn(*amount).display()
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(trimmed.to_string())
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length { field, min, max });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn address() -> NewAddress {
        NewAddress {
            user_id: UserId::random(),
            label: Some("Casa".to_string()),
            recipient_name: "Ana López".to_string(),
            phone: "+52 55 1234 5678".to_string(),
            street: "Av. Insurgentes Sur".to_string(),
            exterior_number: "1602".to_string(),
            interior_number: None,
            neighborhood: "Crédito Constructor".to_string(),
            city: "Ciudad de México".to_string(),
            state: "CDMX".to_string(),
            postal_code: "03940".to_string(),
            country: "MX".to_string(),
            is_default: true,
        }
    }

    #[test]
    fn test_payout_amount_rules() {
        let available = Decimal::new(150_000, 2);
        let minimum = Decimal::new(10_000, 2);

        assert!(validate_payout_amount(Decimal::new(50_000, 2), available, minimum).is_ok());
        assert!(validate_payout_amount(available, available, minimum).is_ok());
        assert_eq!(
            validate_payout_amount(Decimal::ZERO, available, minimum),
            Err(ValidationError::NonPositiveAmount)
        );
        assert_eq!(
            validate_payout_amount(Decimal::new(100_001, 3), available, minimum),
            Err(ValidationError::TooPrecise)
        );
        assert_eq!(
            validate_payout_amount(Decimal::new(5_000, 2), available, minimum),
            Err(ValidationError::BelowMinimum(minimum))
        );
        assert_eq!(
            validate_payout_amount(Decimal::new(150_001, 2), available, minimum),
            Err(ValidationError::InsufficientBalance(available))
        );
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = ValidationError::InsufficientBalance(Decimal::new(150_000, 2));
        assert_eq!(
            err.to_string(),
            "amount exceeds available balance of $1,500.00 MXN"
        );
    }

    #[test]
    fn test_bank_account_ok() {
        let account = validate_bank_account("072180001234567897", "  Ana López ").unwrap();
        assert_eq!(account.bank_name, "BANORTE");
        assert_eq!(account.account_holder, "Ana López");
    }

    #[test]
    fn test_bank_account_rejects_unknown_bank() {
        // 999 prefix with a correct check digit
        let body = "99918000123456789";
        let check = crate::clabe::check_digit(body.as_bytes());
        let err = validate_bank_account(&format!("{body}{check}"), "Ana López").unwrap_err();
        assert_eq!(err, ValidationError::UnknownBank("999".to_string()));
    }

    #[test]
    fn test_bank_account_rejects_bad_checksum_and_blank_holder() {
        assert!(matches!(
            validate_bank_account("072180001234567890", "Ana López"),
            Err(ValidationError::Clabe(ClabeError::ChecksumMismatch { .. }))
        ));
        assert_eq!(
            validate_bank_account("072180001234567897", "   "),
            Err(ValidationError::Required {
                field: "account_holder"
            })
        );
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address(&address()).is_ok());

        let mut bad = address();
        bad.postal_code = "0394".to_string();
        assert!(matches!(
            validate_address(&bad),
            Err(ValidationError::Invalid {
                field: "postal_code",
                ..
            })
        ));

        let mut bad = address();
        bad.phone = "12345".to_string();
        assert!(matches!(
            validate_address(&bad),
            Err(ValidationError::Invalid { field: "phone", .. })
        ));

        let mut bad = address();
        bad.city = String::new();
        assert_eq!(
            validate_address(&bad),
            Err(ValidationError::Required { field: "city" })
        );
    }

    #[test]
    fn test_listing_validation() {
        let price = Decimal::new(450_000, 2);
        assert!(validate_listing("RTX 3080 Founders", None, price, 3).is_ok());
        assert!(matches!(
            validate_listing("GPU", None, price, 3),
            Err(ValidationError::Length { field: "title", .. })
        ));
        assert_eq!(
            validate_listing("RTX 3080 Founders", None, price, 0),
            Err(ValidationError::Required { field: "images" })
        );
        assert_eq!(
            validate_listing("RTX 3080 Founders", None, Decimal::ZERO, 1),
            Err(ValidationError::NonPositiveAmount)
        );
        let long = "x".repeat(MAX_DESCRIPTION_LENGTH + 1);
        assert!(validate_listing("RTX 3080 Founders", Some(&long), price, 1).is_err());
    }
}
