//! CLABE checks.

use hwmarket_core::validate_clabe;

use super::CliError;

/// Print whether a CLABE is valid and which bank issued it.
///
/// # Errors
///
/// Returns `CliError::InvalidClabe` so the process exits non-zero.
#[allow(clippy::print_stdout)]
pub fn validate(input: &str) -> Result<(), CliError> {
    let result = validate_clabe(input);
    let bank = result.bank_name.unwrap_or("unknown bank");
    match result.error {
        None => {
            println!("valid ({bank})");
            Ok(())
        }
        Some(err) => {
            if result.bank_name.is_some() {
                println!("invalid ({bank}): {err}");
            } else {
                println!("invalid: {err}");
            }
            Err(CliError::InvalidClabe(err.to_string()))
        }
    }
}
