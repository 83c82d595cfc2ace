//! Integration tests for the hardware marketplace client.
//!
//! The stores are driven end to end against [`MemoryBackend`], an
//! in-memory implementation of the client's `Backend` trait. Tables are
//! JSON rows filtered with the same `Query` logic the REST backend renders;
//! procedures and functions are closures registered per test.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p hwmarket-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `wallet_payout` - optimistic debit, rollback and idempotent retries
//! - `wallet_sync` - stale-response guard and live updates
//! - `checkout_flow` - quoting, stock revalidation and payment
//! - `account_settings` - addresses and payout bank accounts
//! - `listings_and_inbox` - publishing, browsing cache, favorites, blocks, notifications

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hwmarket_client::backend::{Backend, Query, Table};
use hwmarket_client::{ClientError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Procedure or function body.
pub type Handler = Arc<dyn Fn(&MemoryBackend, Value) -> Result<Value> + Send + Sync>;

/// A backend operation, for failure injection and delays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Select(Table),
    Insert(Table),
    Update(Table),
    Delete(Table),
    Rpc(String),
    Invoke(String),
    Upload,
}

impl Op {
    #[must_use]
    pub fn rpc(name: &str) -> Self {
        Self::Rpc(name.to_string())
    }

    #[must_use]
    pub fn invoke(name: &str) -> Self {
        Self::Invoke(name.to_string())
    }
}

/// One recorded procedure or function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub payload: Value,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    handlers: Mutex<HashMap<Op, Handler>>,
    failures: Mutex<HashMap<Op, usize>>,
    delays: Mutex<HashMap<Op, Duration>>,
    calls: Mutex<Vec<Call>>,
}

/// In-memory backend. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row as-is.
    ///
    /// # Panics
    ///
    /// Panics if `row` does not serialize to a JSON object.
    pub fn seed(&self, table: Table, row: &impl Serialize) {
        let value = serde_json::to_value(row).unwrap_or(Value::Null);
        assert!(value.is_object(), "seeded rows must be objects");
        lock(&self.inner.tables).entry(table).or_default().push(value);
    }

    /// Every row of a table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.inner.tables).get(&table).cloned().unwrap_or_default()
    }

    /// Rows matching a query.
    #[must_use]
    pub fn find(&self, query: &Query) -> Vec<Value> {
        query.apply(&self.rows(query.table_name()))
    }

    /// Merge `patch` into every row matching `query`, as a server-side
    /// change would. Returns the number of rows changed.
    pub fn patch(&self, query: &Query, patch: &Value) -> usize {
        self.patch_rows(query, patch).len()
    }

    /// Patch matching rows and return them as they are now.
    fn patch_rows(&self, query: &Query, patch: &Value) -> Vec<Value> {
        let mut tables = lock(&self.inner.tables);
        let rows = tables.entry(query.table_name()).or_default();
        let mut changed = Vec::new();
        for row in rows.iter_mut().filter(|r| query.matches(r)) {
            merge(row, patch);
            changed.push(row.clone());
        }
        changed
    }

    /// Answer calls to a procedure with `handler`.
    pub fn on_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Self, Value) -> Result<Value> + Send + Sync + 'static,
    {
        lock(&self.inner.handlers).insert(Op::rpc(name), Arc::new(handler));
    }

    /// Answer invocations of a function with `handler`.
    pub fn on_function<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Self, Value) -> Result<Value> + Send + Sync + 'static,
    {
        lock(&self.inner.handlers).insert(Op::invoke(name), Arc::new(handler));
    }

    /// Make the next `times` calls of `op` fail as if the connection dropped.
    pub fn fail_next(&self, op: Op, times: usize) {
        lock(&self.inner.failures).insert(op, times);
    }

    /// Hold every call of `op` for `delay` before answering.
    pub fn delay(&self, op: Op, delay: Duration) {
        lock(&self.inner.delays).insert(op, delay);
    }

    /// Procedure and function calls made so far.
    #[must_use]
    pub fn calls(&self, op: &Op) -> Vec<Value> {
        lock(&self.inner.calls)
            .iter()
            .filter(|c| &c.op == op)
            .map(|c| c.payload.clone())
            .collect()
    }

    /// Shared as the trait object stores take.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn Backend> {
        Arc::new(self.clone())
    }

    async fn enter(&self, op: &Op) -> Result<()> {
        let delay = lock(&self.inner.delays).get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut failures = lock(&self.inner.failures);
        if let Some(remaining) = failures.get_mut(op).filter(|n| **n > 0) {
            *remaining -= 1;
            debug!(?op, "Injected failure");
            return Err(ClientError::Network("connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn dispatch(&self, op: Op, payload: Value) -> Result<Value> {
        lock(&self.inner.calls).push(Call {
            op: op.clone(),
            payload: payload.clone(),
        });
        let handler = lock(&self.inner.handlers).get(&op).cloned();
        match handler {
            Some(handler) => handler(self, payload),
            None => Err(ClientError::Api {
                status: 404,
                code: Some("PGRST202".to_string()),
                message: format!("no handler for {op:?}"),
            }),
        }
    }
}

fn merge(row: &mut Value, patch: &Value) {
    if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            row.insert(key.clone(), value.clone());
        }
    }
}

/// Fill the columns the database would default.
fn with_defaults(row: Value) -> Value {
    let mut object = match row {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object
        .entry("id")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    object
        .entry("created_at")
        .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
    Value::Object(object)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        self.enter(&Op::Select(query.table_name())).await?;
        Ok(self.find(query))
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        self.enter(&Op::Insert(table)).await?;
        let row = with_defaults(row);
        lock(&self.inner.tables)
            .entry(table)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        self.enter(&Op::Update(query.table_name())).await?;
        Ok(self.patch_rows(query, &patch))
    }

    async fn delete(&self, query: &Query) -> Result<()> {
        self.enter(&Op::Delete(query.table_name())).await?;
        lock(&self.inner.tables)
            .entry(query.table_name())
            .or_default()
            .retain(|row| !query.matches(row));
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let op = Op::rpc(function);
        self.enter(&op).await?;
        self.dispatch(op, args)
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value> {
        let op = Op::invoke(function);
        self.enter(&op).await?;
        self.dispatch(op, body)
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.enter(&Op::Upload).await?;
        lock(&self.inner.calls).push(Call {
            op: Op::Upload,
            payload: serde_json::json!({
                "bucket": bucket,
                "path": path,
                "size": bytes.len(),
                "content_type": content_type,
            }),
        });
        Ok(format!("memory://{bucket}/{path}"))
    }
}
