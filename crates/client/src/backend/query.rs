//! Table queries in PostgREST filter syntax.
//!
//! A [`Query`] renders to the query string the REST endpoint understands
//! (`status=eq.active&order=created_at.desc&limit=20`) and can also be
//! evaluated against a JSON row, which is how the realtime feed and the
//! in-memory test backend apply the same filters.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde_json::Value;

/// Tables the client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Addresses,
    Wallets,
    WalletTransactions,
    SellerBankAccounts,
    Notifications,
    PaymentMethods,
    Favorites,
    Reports,
    BlockedUsers,
}

impl Table {
    /// Table name in the backend schema.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Addresses => "addresses",
            Self::Wallets => "wallets",
            Self::WalletTransactions => "wallet_transactions",
            Self::SellerBankAccounts => "seller_bank_accounts",
            Self::Notifications => "notifications",
            Self::PaymentMethods => "payment_methods",
            Self::Favorites => "favorites",
            Self::Reports => "reports",
            Self::BlockedUsers => "blocked_users",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    Gt(String, String),
    Gte(String, String),
    Lt(String, String),
    Lte(String, String),
    In(String, Vec<String>),
    /// Case-insensitive pattern with `*` as the wildcard.
    ILike(String, String),
    IsNull(String),
}

impl Filter {
    /// Column the filter applies to.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Neq(c, _)
            | Self::Gt(c, _)
            | Self::Gte(c, _)
            | Self::Lt(c, _)
            | Self::Lte(c, _)
            | Self::In(c, _)
            | Self::ILike(c, _)
            | Self::IsNull(c) => c,
        }
    }

    /// Right-hand side of the query parameter (`eq.value`).
    #[must_use]
    pub fn operand(&self) -> String {
        match self {
            Self::Eq(_, v) => format!("eq.{v}"),
            Self::Neq(_, v) => format!("neq.{v}"),
            Self::Gt(_, v) => format!("gt.{v}"),
            Self::Gte(_, v) => format!("gte.{v}"),
            Self::Lt(_, v) => format!("lt.{v}"),
            Self::Lte(_, v) => format!("lte.{v}"),
            Self::In(_, values) => {
                let quoted: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                format!("in.({})", quoted.join(","))
            }
            Self::ILike(_, pattern) => format!("ilike.{pattern}"),
            Self::IsNull(_) => "is.null".to_string(),
        }
    }

    /// Evaluate the filter against a row.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        let cell = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::IsNull(_) => cell.is_null(),
            Self::Eq(_, v) => compare(cell, v) == Some(Ordering::Equal),
            Self::Neq(_, v) => !cell.is_null() && compare(cell, v) != Some(Ordering::Equal),
            Self::Gt(_, v) => compare(cell, v) == Some(Ordering::Greater),
            Self::Gte(_, v) => matches!(compare(cell, v), Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt(_, v) => compare(cell, v) == Some(Ordering::Less),
            Self::Lte(_, v) => matches!(compare(cell, v), Some(Ordering::Less | Ordering::Equal)),
            Self::In(_, values) => values
                .iter()
                .any(|v| compare(cell, v) == Some(Ordering::Equal)),
            Self::ILike(_, pattern) => {
                cell_text(cell).is_some_and(|text| ilike(&text, pattern))
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: Table,
    columns: String,
    filters: Vec<Filter>,
    order: Vec<(String, Direction)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// Select every column of a table.
    #[must_use]
    pub fn table(table: Table) -> Self {
        Self {
            table,
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Restrict the selected columns.
    #[must_use]
    pub fn columns(mut self, columns: &str) -> Self {
        columns.clone_into(&mut self.columns);
        self
    }

    /// Add `column = value`.
    #[must_use]
    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.to_string()))
    }

    /// Add `column <> value`.
    #[must_use]
    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Neq(column.to_string(), value.to_string()))
    }

    /// Add `column >= value`.
    #[must_use]
    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.to_string()))
    }

    /// Add `column <= value`.
    #[must_use]
    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Lte(column.to_string(), value.to_string()))
    }

    /// Add `column IN (values)`.
    #[must_use]
    pub fn in_list<I, S>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.filter(Filter::In(
            column.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        ))
    }

    /// Add a case-insensitive substring match.
    #[must_use]
    pub fn search(self, column: &str, term: &str) -> Self {
        self.filter(Filter::ILike(column.to_string(), format!("*{}*", term.trim())))
    }

    /// Add an arbitrary filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append a sort key.
    #[must_use]
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    /// Limit the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Table being queried.
    #[must_use]
    pub const fn table_name(&self) -> Table {
        self.table
    }

    /// Filters in insertion order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Query-string pairs for the REST endpoint.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(
            self.filters
                .iter()
                .map(|f| (f.column().to_string(), f.operand())),
        );
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, direction)| match direction {
                    Direction::Asc => format!("{column}.asc"),
                    Direction::Desc => format!("{column}.desc"),
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Returns `true` if the row passes every filter.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Filter, sort and page rows the way the backend would.
    #[must_use]
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.iter().filter(|r| self.matches(r)).cloned().collect();

        selected.sort_by(|a, b| {
            for (column, direction) in &self.order {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                let ord = compare_values(left, right);
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(offset).take(limit).collect()
    }
}

fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn cell_text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compare a cell with a filter operand, numerically when both sides are
/// numbers.
fn compare(cell: &Value, operand: &str) -> Option<Ordering> {
    let text = cell_text(cell)?;
    match (text.parse::<Decimal>(), operand.parse::<Decimal>()) {
        (Ok(a), Ok(b)) => Some(a.cmp(&b)),
        _ => Some(text.as_str().cmp(operand)),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (cell_text(a), cell_text(b)) {
        (None, None) => Ordering::Equal,
        // Nulls sort last, as in Postgres ascending order.
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare(&Value::String(x), &y).unwrap_or(Ordering::Equal),
    }
}

fn ilike(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();

    let mut rest = text.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        let anchored_start = i == 0;
        let anchored_end = i == parts.len() - 1;
        if anchored_start {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if anchored_end {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = rest.get(pos + part.len()..).unwrap_or_default(),
                None => return false,
            }
        }
    }
    parts.last().is_some_and(|last| last.is_empty()) || rest.is_empty()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_params() {
        let query = Query::table(Table::WalletTransactions)
            .eq("wallet_id", "abc")
            .in_list("status", ["pending", "completed"])
            .order("created_at", Direction::Desc)
            .limit(50);

        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("wallet_id".to_string(), "eq.abc".to_string()),
                ("status".to_string(), "in.(pending,completed)".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_in_list_quotes_reserved_characters() {
        let filter = Filter::In("title".to_string(), vec!["a,b".to_string(), "c".to_string()]);
        assert_eq!(filter.operand(), "in.(\"a,b\",c)");
    }

    #[test]
    fn test_numeric_comparison() {
        let row = json!({ "price": 1500.5 });
        assert!(Filter::Gte("price".into(), "1500.50".into()).matches(&row));
        assert!(Filter::Lt("price".into(), "2000".into()).matches(&row));
        assert!(!Filter::Gt("price".into(), "1500.5".into()).matches(&row));
        assert!(Filter::Eq("price".into(), "1500.500".into()).matches(&row));
    }

    #[test]
    fn test_eq_on_strings_and_bools() {
        let row = json!({ "status": "active", "is_default": true, "deleted_at": null });
        assert!(Filter::Eq("status".into(), "active".into()).matches(&row));
        assert!(Filter::Eq("is_default".into(), "true".into()).matches(&row));
        assert!(Filter::IsNull("deleted_at".into()).matches(&row));
        assert!(Filter::IsNull("missing".into()).matches(&row));
        assert!(!Filter::Neq("deleted_at".into(), "x".into()).matches(&row));
    }

    #[test]
    fn test_ilike() {
        let row = json!({ "title": "NVIDIA RTX 3080 Founders Edition" });
        assert!(Filter::ILike("title".into(), "*rtx 3080*".into()).matches(&row));
        assert!(Filter::ILike("title".into(), "nvidia*".into()).matches(&row));
        assert!(Filter::ILike("title".into(), "*edition".into()).matches(&row));
        assert!(!Filter::ILike("title".into(), "*radeon*".into()).matches(&row));
        assert!(!Filter::ILike("title".into(), "rtx*".into()).matches(&row));
    }

    #[test]
    fn test_apply_sorts_filters_and_pages() {
        let rows = vec![
            json!({ "id": 1, "seller": "a", "created_at": "2024-01-01T00:00:00Z" }),
            json!({ "id": 2, "seller": "b", "created_at": "2024-01-03T00:00:00Z" }),
            json!({ "id": 3, "seller": "a", "created_at": "2024-01-02T00:00:00Z" }),
            json!({ "id": 4, "seller": "a", "created_at": "2024-01-04T00:00:00Z" }),
        ];
        let query = Query::table(Table::Products)
            .eq("seller", "a")
            .order("created_at", Direction::Desc)
            .offset(1)
            .limit(1);

        let result = query.apply(&rows);
        assert_eq!(result, vec![json!({ "id": 3, "seller": "a", "created_at": "2024-01-02T00:00:00Z" })]);
    }
}
