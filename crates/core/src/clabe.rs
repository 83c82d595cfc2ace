//! CLABE (Clave Bancaria Estandarizada) validation.
//!
//! A CLABE is 18 digits:
//!
//! | digits | meaning |
//! |---|---|
//! | 1-3 | bank code (ABM) |
//! | 4-6 | plaza (city) code |
//! | 7-17 | account number |
//! | 18 | check digit |
//!
//! The check digit is a weighted modulo-10 sum over the first 17 digits with
//! weights `3, 7, 1` repeating:
//!
//! ```text
//! check = (10 - (Σ (digit[i] * weight[i] mod 10)) mod 10) mod 10
//! ```
//!
//! # Example
//!
//! ```
//! use hwmarket_core::clabe::{Clabe, validate_clabe};
//!
//! let clabe = Clabe::parse("072 180 00123456789 7").unwrap();
//! assert_eq!(clabe.bank_name(), Some("BANORTE"));
//!
//! let result = validate_clabe("072180001234567890");
//! assert!(!result.valid);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Number of digits in a CLABE.
pub const CLABE_LENGTH: usize = 18;

const WEIGHTS: [u32; 3] = [3, 7, 1];

/// ABM bank codes and the short names shown to users.
const BANKS: &[(&str, &str)] = &[
    ("002", "BANAMEX"),
    ("006", "BANCOMEXT"),
    ("009", "BANOBRAS"),
    ("012", "BBVA MEXICO"),
    ("014", "SANTANDER"),
    ("019", "BANJERCITO"),
    ("021", "HSBC"),
    ("030", "BAJIO"),
    ("036", "INBURSA"),
    ("042", "MIFEL"),
    ("044", "SCOTIABANK"),
    ("058", "BANREGIO"),
    ("059", "INVEX"),
    ("060", "BANSI"),
    ("062", "AFIRME"),
    ("072", "BANORTE"),
    ("106", "BANK OF AMERICA"),
    ("108", "MUFG"),
    ("110", "JP MORGAN"),
    ("112", "BMONEX"),
    ("113", "VE POR MAS"),
    ("127", "AZTECA"),
    ("128", "AUTOFIN"),
    ("129", "BARCLAYS"),
    ("130", "COMPARTAMOS"),
    ("132", "MULTIVA BANCO"),
    ("133", "ACTINVER"),
    ("135", "NAFIN"),
    ("136", "INTERCAM BANCO"),
    ("137", "BANCOPPEL"),
    ("138", "ABC CAPITAL"),
    ("140", "CONSUBANCO"),
    ("141", "VOLKSWAGEN"),
    ("143", "CIBANCO"),
    ("145", "BBASE"),
    ("147", "BANKAOOL"),
    ("148", "PAGATODO"),
    ("150", "INMOBILIARIO"),
    ("151", "DONDE"),
    ("152", "BANCREA"),
    ("154", "BANCO FINTERRA"),
    ("155", "ICBC"),
    ("156", "SABADELL"),
    ("157", "SHINHAN"),
    ("158", "MIZUHO BANK"),
    ("160", "BANCO S3"),
    ("166", "BANCO DEL BIENESTAR"),
    ("168", "HIPOTECARIA FEDERAL"),
    ("600", "MONEXCB"),
    ("601", "GBM"),
    ("638", "NU MEXICO"),
    ("646", "STP"),
    ("722", "MERCADO PAGO W"),
];

/// Errors that can occur when parsing a [`Clabe`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClabeError {
    /// Input does not have exactly 18 digits.
    #[error("CLABE must have {CLABE_LENGTH} digits (got {0})")]
    WrongLength(usize),
    /// Input contains something other than digits, spaces or dashes.
    #[error("CLABE may only contain digits")]
    NonDigit,
    /// The check digit does not match the computed one.
    #[error("CLABE check digit is {found}, expected {expected}")]
    ChecksumMismatch {
        /// Check digit computed from the first 17 digits.
        expected: u8,
        /// Check digit present in the input.
        found: u8,
    },
}

/// A checksum-valid CLABE.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Clabe(String);

impl Clabe {
    /// Parse and verify a CLABE.
    ///
    /// Spaces and dashes are ignored so pasted, grouped input is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 18 digits or the check digit
    /// does not match.
    pub fn parse(input: &str) -> Result<Self, ClabeError> {
        let digits = sanitize(input)?;
        if digits.len() != CLABE_LENGTH {
            return Err(ClabeError::WrongLength(digits.len()));
        }

        let (body, check) = digits.split_at(CLABE_LENGTH - 1);
        let expected = check_digit(body.as_bytes());
        let found = check.as_bytes().first().map_or(0, |b| b - b'0');
        if expected != found {
            return Err(ClabeError::ChecksumMismatch { expected, found });
        }

        Ok(Self(digits))
    }

    /// The 18 digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Three-digit ABM bank code.
    #[must_use]
    pub fn bank_code(&self) -> &str {
        self.0.get(..3).unwrap_or_default()
    }

    /// Three-digit plaza code.
    #[must_use]
    pub fn plaza_code(&self) -> &str {
        self.0.get(3..6).unwrap_or_default()
    }

    /// Eleven-digit account number.
    #[must_use]
    pub fn account_number(&self) -> &str {
        self.0.get(6..17).unwrap_or_default()
    }

    /// Bank name for the prefix, if the bank is known.
    #[must_use]
    pub fn bank_name(&self) -> Option<&'static str> {
        bank_name(self.bank_code())
    }
}

impl fmt::Display for Clabe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Clabe {
    type Err = ClabeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Clabe {
    type Error = ClabeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Clabe> for String {
    fn from(clabe: Clabe) -> Self {
        clabe.0
    }
}

/// Form-oriented validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClabeValidation {
    pub valid: bool,
    pub bank_name: Option<&'static str>,
    pub error: Option<ClabeError>,
}

/// Validate a CLABE as typed by a user.
///
/// `bank_name` is filled whenever the first three digits are a known bank
/// code, even if the checksum fails, so forms can show it while typing.
#[must_use]
pub fn validate_clabe(input: &str) -> ClabeValidation {
    let prefix_bank = sanitize(input)
        .ok()
        .and_then(|digits| digits.get(..3).and_then(bank_name));

    match Clabe::parse(input) {
        Ok(clabe) => ClabeValidation {
            valid: true,
            bank_name: clabe.bank_name(),
            error: None,
        },
        Err(err) => ClabeValidation {
            valid: false,
            bank_name: prefix_bank,
            error: Some(err),
        },
    }
}

/// Look up a bank by its three-digit ABM code.
#[must_use]
pub fn bank_name(code: &str) -> Option<&'static str> {
    BANKS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Compute the check digit for 17 ASCII digits.
///
/// Callers must pass ASCII digits only.
#[must_use]
pub fn check_digit(body: &[u8]) -> u8 {
    let sum: u32 = body
        .iter()
        .zip(WEIGHTS.iter().cycle())
        .map(|(b, w)| (u32::from(b.wrapping_sub(b'0')) % 10 * w) % 10)
        .sum();
    // Always < 10.
    u8::try_from((10 - sum % 10) % 10).unwrap_or(0)
}

fn sanitize(input: &str) -> Result<String, ClabeError> {
    let mut digits = String::with_capacity(CLABE_LENGTH);
    for ch in input.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' => {}
            _ => return Err(ClabeError::NonDigit),
        }
    }
    Ok(digits)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const BANORTE: &str = "072180001234567897";
    const BANAMEX: &str = "002010077777777771";
    const STP: &str = "646180157000000004";

    #[test]
    fn test_known_clabes_validate_to_bank() {
        assert_eq!(Clabe::parse(BANORTE).unwrap().bank_name(), Some("BANORTE"));
        assert_eq!(Clabe::parse(BANAMEX).unwrap().bank_name(), Some("BANAMEX"));
        assert_eq!(Clabe::parse(STP).unwrap().bank_name(), Some("STP"));
    }

    #[test]
    fn test_components() {
        let clabe = Clabe::parse(BANORTE).unwrap();
        assert_eq!(clabe.bank_code(), "072");
        assert_eq!(clabe.plaza_code(), "180");
        assert_eq!(clabe.account_number(), "00123456789");
    }

    #[test]
    fn test_grouped_input_is_accepted() {
        let clabe = Clabe::parse("072-180-00123456789-7").unwrap();
        assert_eq!(clabe.as_str(), BANORTE);
    }

    #[test]
    fn test_wrong_check_digit() {
        assert_eq!(
            Clabe::parse("072180001234567890"),
            Err(ClabeError::ChecksumMismatch {
                expected: 7,
                found: 0
            })
        );
    }

    #[test]
    fn test_wrong_length_and_non_digit() {
        assert_eq!(Clabe::parse("07218000"), Err(ClabeError::WrongLength(8)));
        assert_eq!(Clabe::parse(""), Err(ClabeError::WrongLength(0)));
        assert_eq!(
            Clabe::parse("07218000123456789A"),
            Err(ClabeError::NonDigit)
        );
    }

    #[test]
    fn test_single_digit_mutation_invalidates() {
        for valid in [BANORTE, BANAMEX, STP] {
            let original = valid.as_bytes();
            for pos in 0..CLABE_LENGTH - 1 {
                for digit in b'0'..=b'9' {
                    if digit == original[pos] {
                        continue;
                    }
                    let mut mutated = original.to_vec();
                    mutated[pos] = digit;
                    let mutated = String::from_utf8(mutated).unwrap();
                    assert!(
                        Clabe::parse(&mutated).is_err(),
                        "{mutated} should fail (mutated position {pos} of {valid})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_check_digit_is_deterministic() {
        let body = &BANORTE.as_bytes()[..17];
        let first = check_digit(body);
        for _ in 0..10 {
            assert_eq!(check_digit(body), first);
        }
        assert_eq!(first, 7);
    }

    #[test]
    fn test_unknown_bank_passes_checksum() {
        let body = b"99918000123456789";
        let check = check_digit(body);
        let input = format!("{}{check}", std::str::from_utf8(body).unwrap());
        let clabe = Clabe::parse(&input).unwrap();
        assert_eq!(clabe.bank_name(), None);
    }

    #[test]
    fn test_validate_clabe_reports_bank_while_invalid() {
        let result = validate_clabe("0721800012");
        assert!(!result.valid);
        assert_eq!(result.bank_name, Some("BANORTE"));
        assert_eq!(result.error, Some(ClabeError::WrongLength(10)));

        let result = validate_clabe(BANORTE);
        assert!(result.valid);
        assert_eq!(result.bank_name, Some("BANORTE"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: Clabe = serde_json::from_str(&format!("\"{BANORTE}\"")).unwrap();
        assert_eq!(ok.as_str(), BANORTE);
        assert!(serde_json::from_str::<Clabe>("\"072180001234567890\"").is_err());
    }
}
