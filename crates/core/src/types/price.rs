//! Decimal money helpers.
//!
//! All amounts on the wire are `numeric` columns. They are carried as
//! [`Decimal`] end to end and only rounded at the boundaries defined here.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places money is rounded to.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to cents, midpoints away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `true` if the amount has no more than two decimal places.
#[must_use]
pub fn has_cent_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (pesos, not centavos).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in Mexican pesos.
    #[must_use]
    pub const fn mxn(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::MXN)
    }

    /// Format for display (e.g., "$1,299.00 MXN").
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = round_money(self.amount);
        let negative = rounded.is_sign_negative() && !rounded.is_zero();
        let text = format!("{:.2}", rounded.abs());
        let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        format!(
            "{}{}{grouped}.{cents} {}",
            if negative { "-" } else { "" },
            self.currency_code.symbol(),
            self.currency_code.code()
        )
    }
}

/// ISO 4217 currency codes the marketplace settles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    MXN,
    USD,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::MXN | Self::USD => "$",
        }
    }

    /// Three-letter code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MXN => "MXN",
            Self::USD => "USD",
        }
    }
}
