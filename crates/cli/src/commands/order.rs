//! Order pricing from the command line.

use std::str::FromStr;

use hwmarket_core::order::missing_quotes;
use hwmarket_core::{OrderItem, ProductId, ServiceFee, ShippingCosts, calculate_order};
use rust_decimal::Decimal;

use super::mxn;

/// One `--item` argument: a product line and its quoted shipping, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub item: OrderItem,
    pub shipping: Option<Decimal>,
}

fn parse_amount(raw: &str, what: &str) -> Result<Decimal, String> {
    let amount = Decimal::from_str(raw.trim()).map_err(|e| format!("invalid {what} '{raw}': {e}"))?;
    if amount.is_sign_negative() {
        return Err(format!("{what} cannot be negative"));
    }
    Ok(amount)
}

/// Parse `PRICE[xQTY][+SHIPPING]`, e.g. `4500`, `1200x2`, `4500+180`.
///
/// # Errors
///
/// Returns a message naming the part that did not parse.
pub fn parse_order_line(input: &str) -> Result<OrderLine, String> {
    let (line, shipping) = match input.split_once('+') {
        Some((line, shipping)) => (line, Some(parse_amount(shipping, "shipping")?)),
        None => (input, None),
    };
    let (price, quantity) = match line.split_once(['x', 'X']) {
        Some((price, qty)) => {
            let qty = qty
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid quantity '{qty}': {e}"))?;
            if qty == 0 {
                return Err("quantity must be at least 1".to_string());
            }
            (price, qty)
        }
        None => (line, 1),
    };

    Ok(OrderLine {
        item: OrderItem {
            product_id: ProductId::random(),
            unit_price: parse_amount(price, "price")?,
            quantity,
        },
        shipping,
    })
}

/// Print the totals for a set of lines.
#[allow(clippy::print_stdout)]
pub fn quote(lines: &[OrderLine], fee_percent: Decimal, fee_fixed: Decimal) {
    let items: Vec<OrderItem> = lines.iter().map(|l| l.item).collect();
    let shipping: ShippingCosts = lines
        .iter()
        .filter_map(|l| l.shipping.map(|cost| (l.item.product_id, cost)))
        .collect();
    let totals = calculate_order(&items, &shipping, &ServiceFee::new(fee_percent, fee_fixed));

    println!("Subtotal     {}", mxn(totals.subtotal));
    println!("Shipping     {}", mxn(totals.shipping_cost));
    println!("Service fee  {}", mxn(totals.service_fee));
    println!("Total        {}", mxn(totals.total));

    let unquoted = missing_quotes(&items, &shipping).len();
    if unquoted > 0 {
        tracing::warn!("{unquoted} line(s) have no shipping quote and were priced without shipping");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_line() {
        let plain = parse_order_line("4500").unwrap();
        assert_eq!(plain.item.unit_price, Decimal::new(4500, 0));
        assert_eq!(plain.item.quantity, 1);
        assert_eq!(plain.shipping, None);

        let full = parse_order_line("1200.50x2+180").unwrap();
        assert_eq!(full.item.unit_price, Decimal::new(120_050, 2));
        assert_eq!(full.item.quantity, 2);
        assert_eq!(full.shipping, Some(Decimal::new(180, 0)));
    }

    #[test]
    fn test_parse_order_line_rejects_bad_input() {
        assert!(parse_order_line("abc").is_err());
        assert!(parse_order_line("100x0").is_err());
        assert!(parse_order_line("-5").is_err());
        assert!(parse_order_line("100+free").is_err());
    }
}
