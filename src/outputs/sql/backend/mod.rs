//! Database seam of the SQL output.
//!
//! The output only ever talks to a [`Database`] (pool-level statements) and a
//! [`Transaction`] (one prepared statement executed many times). A
//! [`Connector`] turns a driver name and DSN into a [`Database`]; the bundled
//! [`SqlxConnector`] covers the drivers sqlx ships with.

mod pool;

pub use pool::{MySqlDatabase, PostgresDatabase, SqliteDatabase, SqlxConnector};

use crate::errors::DriverError;
use crate::metric::FieldValue;
use crate::outputs::sql::dialect::Driver;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl From<&FieldValue> for SqlValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Int(v) => Self::Int(*v),
            FieldValue::UInt(v) => Self::UInt(*v),
            FieldValue::Float(v) => Self::Float(*v),
            FieldValue::Str(v) => Self::Text(v.clone()),
            FieldValue::Bool(v) => Self::Bool(*v),
            FieldValue::Json(v) => Self::Json(v.clone()),
        }
    }
}

/// Connection pool tuning. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_idle_time: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub max_idle: Option<u32>,
    pub max_open: Option<u32>,
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn ping(&self) -> Result<(), DriverError>;

    /// Run a statement, binding `params` positionally.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<(), DriverError>;

    /// Run a query returning one text column and collect it.
    async fn query_strings(&self, sql: &str) -> Result<Vec<String>, DriverError>;

    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError>;

    async fn close(&self);
}

/// An open transaction holding at most one prepared statement.
///
/// Dropping an unfinished transaction rolls it back.
#[async_trait]
pub trait Transaction: Send {
    async fn prepare(&mut self, sql: &str) -> Result<(), DriverError>;

    async fn execute_prepared(&mut self, params: &[SqlValue]) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        driver: Driver,
        dsn: &str,
        settings: &PoolSettings,
    ) -> Result<Box<dyn Database>, DriverError>;
}
