//! Order totals.
//!
//! Pure arithmetic shared by the cart, the checkout and the CLI. Every
//! component is rounded to cents on its own and the total is the exact sum
//! of the rounded components, so what the buyer sees always adds up.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, round_money};

/// One purchasable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    /// `unit_price * quantity`, unrounded.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Marketplace commission charged to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFee {
    /// Fraction of the subtotal, e.g. `0.05` for 5%.
    pub percentage: Decimal,
    /// Flat amount added per order.
    pub fixed: Decimal,
}

impl ServiceFee {
    /// Create a fee schedule.
    #[must_use]
    pub const fn new(percentage: Decimal, fixed: Decimal) -> Self {
        Self { percentage, fixed }
    }

    /// A fee schedule that charges nothing.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Fee for a given subtotal, unrounded. Empty orders are free.
    #[must_use]
    pub fn apply(&self, subtotal: Decimal) -> Decimal {
        if subtotal.is_zero() {
            return Decimal::ZERO;
        }
        subtotal * self.percentage + self.fixed
    }
}

impl Default for ServiceFee {
    /// 5% + $10.00 MXN.
    fn default() -> Self {
        Self::new(Decimal::new(5, 2), Decimal::new(1000, 2))
    }
}

/// Shipping cost per product, as quoted for the buyer's address.
pub type ShippingCosts = HashMap<ProductId, Decimal>;

/// Computed totals for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

/// Compute the totals of an order.
///
/// Shipping is charged once per line; a line with no entry in
/// `shipping_costs` contributes nothing. Each component is rounded to two
/// decimals before being summed into `total`.
#[must_use]
pub fn calculate_order(
    items: &[OrderItem],
    shipping_costs: &ShippingCosts,
    fee: &ServiceFee,
) -> OrderTotals {
    if items.is_empty() {
        return OrderTotals::default();
    }

    let raw_subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
    let raw_shipping: Decimal = items
        .iter()
        .filter_map(|item| shipping_costs.get(&item.product_id))
        .copied()
        .sum();

    let subtotal = round_money(raw_subtotal);
    let shipping_cost = round_money(raw_shipping);
    let service_fee = round_money(fee.apply(subtotal));

    OrderTotals {
        subtotal,
        shipping_cost,
        service_fee,
        total: subtotal + shipping_cost + service_fee,
    }
}

/// Product IDs in `items` that have no shipping quote yet.
#[must_use]
pub fn missing_quotes(items: &[OrderItem], shipping_costs: &ShippingCosts) -> Vec<ProductId> {
    items
        .iter()
        .map(|item| item.product_id)
        .filter(|id| !shipping_costs.contains_key(id))
        .collect()
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn item(cents: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: ProductId::random(),
            unit_price: Decimal::new(cents, 2),
            quantity,
        }
    }

    #[test]
    fn test_empty_order_is_zero() {
        let totals = calculate_order(&[], &ShippingCosts::new(), &ServiceFee::default());
        assert_eq!(totals, OrderTotals::default());
        assert!(totals.total.is_zero());
    }

    #[test]
    fn test_totals_add_up() {
        let gpu = item(850_000, 1);
        let ram = item(129_999, 2);
        let mut shipping = ShippingCosts::new();
        shipping.insert(gpu.product_id, Decimal::new(18_950, 2));
        shipping.insert(ram.product_id, Decimal::new(9_900, 2));

        let totals = calculate_order(&[gpu, ram], &shipping, &ServiceFee::default());

        assert_eq!(totals.subtotal, Decimal::new(1_109_998, 2));
        assert_eq!(totals.shipping_cost, Decimal::new(28_850, 2));
        // 11099.98 * 0.05 = 554.999 -> 555.00, + 10.00
        assert_eq!(totals.service_fee, Decimal::new(56_500, 2));
        assert_eq!(
            totals.total,
            totals.subtotal + totals.shipping_cost + totals.service_fee
        );
        assert_eq!(totals.total, Decimal::new(1_195_348, 2));
    }

    #[test]
    fn test_missing_shipping_contributes_zero() {
        let cpu = item(450_000, 1);
        let totals = calculate_order(&[cpu], &ShippingCosts::new(), &ServiceFee::zero());
        assert!(totals.shipping_cost.is_zero());
        assert_eq!(totals.total, Decimal::new(450_000, 2));
        assert_eq!(missing_quotes(&[cpu], &ShippingCosts::new()), vec![cpu.product_id]);
    }

    #[test]
    fn test_fee_components_rounded_before_summing() {
        // 3 * 33.33 = 99.99; 99.99 * 0.035 = 3.49965 -> 3.50
        let fee = ServiceFee::new(Decimal::new(35, 3), Decimal::ZERO);
        let totals = calculate_order(&[item(3333, 3)], &ShippingCosts::new(), &fee);
        assert_eq!(totals.service_fee, Decimal::new(350, 2));
        assert_eq!(totals.total, Decimal::new(10349, 2));
        assert_eq!(totals.total.scale(), 2);
    }

    #[test]
    fn test_is_pure() {
        let items = [item(100_000, 1), item(25_050, 3)];
        let mut shipping = ShippingCosts::new();
        shipping.insert(items[0].product_id, Decimal::new(15_000, 2));
        let fee = ServiceFee::default();

        let first = calculate_order(&items, &shipping, &fee);
        let second = calculate_order(&items, &shipping, &fee);
        assert_eq!(first, second);
    }

    #[test]
    fn test_total_identity_over_many_orders() {
        let fee = ServiceFee::new(Decimal::new(37, 3), Decimal::new(499, 2));
        for n in 1..40_i64 {
            let items: Vec<OrderItem> = (1..=n % 5 + 1)
                .map(|k| item(n * 1_337 + k * 71, u32::try_from(k).unwrap_or(1)))
                .collect();
            let shipping: ShippingCosts = items
                .iter()
                .map(|i| (i.product_id, Decimal::new(n * 13 + 1, 1)))
                .collect();
            let totals = calculate_order(&items, &shipping, &fee);
            assert_eq!(
                totals.total,
                totals.subtotal + totals.shipping_cost + totals.service_fee
            );
        }
    }
}
