use super::backend::PoolSettings;
use super::schema::TypeMapping;
use crate::errors::SqlError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Settings of the SQL output, read from `[outputs.sql]`.
///
/// ```toml
/// [outputs.sql]
/// driver = "pgx"
/// data_source_name = "postgres://metrics:${PG_PASSWORD}@db:5432/metrics"
/// table_update_template = "ALTER TABLE {TABLE} ADD COLUMN {COLUMN}"
/// prepare_write_tx = true
///
/// [outputs.sql.convert]
/// real = "DOUBLE PRECISION"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// One of clickhouse, mssql, mysql, pgx, snowflake, sqlite.
    pub driver: String,
    pub data_source_name: Secret,
    /// Empty disables the timestamp column.
    pub timestamp_column: String,
    /// Empty uses the driver's default.
    pub table_template: String,
    /// Empty uses the driver's default.
    pub table_exists_template: String,
    /// Empty disables adding columns to existing tables.
    pub table_update_template: String,
    /// Executed once after connecting.
    pub init_sql: String,
    pub prepare_write_tx: bool,
    pub convert: TypeMapping,
    /// 0 = unlimited
    pub connection_max_idle_time_secs: u64,
    /// 0 = unlimited
    pub connection_max_lifetime_secs: u64,
    pub connection_max_idle: u32,
    /// 0 = driver default
    pub connection_max_open: u32,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            data_source_name: Secret::default(),
            timestamp_column: "timestamp".into(),
            table_template: String::new(),
            table_exists_template: String::new(),
            table_update_template: String::new(),
            init_sql: String::new(),
            prepare_write_tx: false,
            convert: TypeMapping::default(),
            connection_max_idle_time_secs: 0,
            connection_max_lifetime_secs: 0,
            connection_max_idle: 2,
            connection_max_open: 0,
        }
    }
}

impl SqlConfig {
    pub fn timestamp_column(&self) -> Option<&str> {
        (!self.timestamp_column.is_empty()).then_some(self.timestamp_column.as_str())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        let count = |n: u32| (n > 0).then_some(n);
        PoolSettings {
            max_idle_time: secs(self.connection_max_idle_time_secs),
            max_lifetime: secs(self.connection_max_lifetime_secs),
            max_idle: count(self.connection_max_idle),
            max_open: count(self.connection_max_open),
        }
    }
}

/// Connection string that may carry credentials.
///
/// Never printed, and `${VAR}` references are expanded from the environment
/// only when the value is needed.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn resolve(&self) -> Result<String, SqlError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    fn resolve_with<F>(&self, lookup: F) -> Result<String, SqlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| SqlError::Secret("unterminated ${ reference".into()))?;
            let name = &after[..end];
            if name.is_empty() {
                return Err(SqlError::Secret("empty ${} reference".into()));
            }
            let value = lookup(name).ok_or_else(|| {
                SqlError::Secret(format!("environment variable {name} is not set"))
            })?;
            out.push_str(&value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}
