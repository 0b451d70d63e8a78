//! Output persisting metrics into a relational database.
//!
//! Every metric becomes one row in the table named after it. Tables are
//! created on first sight and, when a column update template is configured,
//! grown as new tags and fields show up. Rows are either inserted one by one
//! or, with `prepare_write_tx`, grouped per insert statement and written in
//! one transaction per group.

pub mod backend;
pub mod config;
pub mod dialect;
pub mod dsn;
pub mod executor;
pub mod schema;
pub mod statement;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Secret, SqlConfig};

use self::backend::{Connector, Database, SqlxConnector};
use self::dialect::{Dialect, Driver};
use self::executor::{send_prepared, send_unprepared, PendingBatch};
use self::schema::{SchemaCache, SchemaManager, SchemaTemplates};
use self::statement::{Row, StatementCache};
use super::Output;
use crate::errors::{PluginError, SqlError};
use crate::metric::Metric;
use async_trait::async_trait;
use std::sync::Arc;

struct Session {
    db: Box<dyn Database>,
    schema: SchemaManager,
    statements: StatementCache,
}

pub struct SqlOutput {
    config: SqlConfig,
    connector: Arc<dyn Connector>,
    dialect: Option<Dialect>,
    session: Option<Session>,
}

impl SqlOutput {
    pub fn new(config: SqlConfig) -> Self {
        Self::with_connector(config, Arc::new(SqlxConnector))
    }

    /// Use a custom client, e.g. for drivers sqlx doesn't ship.
    pub fn with_connector(config: SqlConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            dialect: None,
            session: None,
        }
    }

    pub fn config(&self) -> &SqlConfig {
        &self.config
    }

    /// Tables and columns known for the current connection.
    pub fn schema_cache(&self) -> Option<&SchemaCache> {
        self.session.as_ref().map(|s| s.schema.cache())
    }

    pub fn init_output(&mut self) -> Result<(), SqlError> {
        let driver: Driver = self.config.driver.parse()?;
        let dialect = driver.dialect();

        if self.config.table_template.is_empty() {
            self.config.table_template = dialect.table_template.to_string();
        }
        if self.config.table_exists_template.is_empty() {
            self.config.table_exists_template = dialect.exists_template.to_string();
        }

        if driver == Driver::ClickHouse {
            let dsn = self.config.data_source_name.resolve()?;
            self.config.data_source_name = Secret::new(dsn::convert_clickhouse_dsn(&dsn));
        }

        tracing::debug!(%driver, "sql output initialised");
        self.dialect = Some(dialect);
        Ok(())
    }

    pub async fn connect_output(&mut self) -> Result<(), SqlError> {
        let dialect = self.dialect.ok_or(SqlError::NotInitialized)?;
        let dsn = self.config.data_source_name.resolve()?;
        self.close_output().await;

        let db = self
            .connector
            .connect(dialect.driver, &dsn, &self.config.pool_settings())
            .await
            .map_err(SqlError::Open)?;
        db.ping().await.map_err(SqlError::Ping)?;

        if !self.config.init_sql.is_empty() {
            db.execute(&self.config.init_sql, &[])
                .await
                .map_err(SqlError::InitSql)?;
        }

        let templates = SchemaTemplates {
            create_table: self.config.table_template.clone(),
            table_exists: self.config.table_exists_template.clone(),
            add_column: (!self.config.table_update_template.is_empty())
                .then(|| self.config.table_update_template.clone()),
            list_columns: dialect.list_columns_template.to_string(),
        };
        let schema = SchemaManager::new(
            templates,
            self.config.timestamp_column().map(str::to_string),
            self.config.convert.clone(),
            SchemaCache::default(),
        );

        tracing::info!(driver = %dialect.driver, "connected to database");
        self.session = Some(Session {
            db,
            schema,
            statements: StatementCache::default(),
        });
        Ok(())
    }

    /// Persist one batch. The first failure aborts the rest of the batch;
    /// groups already committed stay committed.
    pub async fn write_metrics(&mut self, metrics: &[Metric]) -> Result<(), SqlError> {
        let dialect = self.dialect.ok_or(SqlError::NotInitialized)?;
        let timestamp_column = self.config.timestamp_column();
        let prepared = self.config.prepare_write_tx;
        let Session {
            db,
            schema,
            statements,
        } = self.session.as_mut().ok_or(SqlError::NotConnected)?;
        let db = &**db;

        let mut pending = PendingBatch::default();
        for metric in metrics {
            let table = metric.name();
            schema.ensure_table(db, metric).await?;

            let row = Row::from_metric(metric, timestamp_column);
            let sql = statements.get_or_generate(table, &row, dialect.placeholder);

            schema.ensure_columns(db, table, &row.columns).await?;

            if prepared {
                pending.push(sql, row.params);
            } else {
                send_unprepared(db, &dialect, sql, &row.params).await?;
            }
        }

        if !pending.is_empty() {
            tracing::debug!(
                statements = pending.statements(),
                rows = pending.rows(),
                "writing batched transactions"
            );
            for (sql, rows) in pending.into_groups() {
                send_prepared(db, &sql, &rows)
                    .await
                    .map_err(|e| SqlError::Batch(Box::new(e)))?;
            }
        }
        Ok(())
    }

    pub async fn close_output(&mut self) {
        if let Some(session) = self.session.take() {
            session.db.close().await;
        }
    }
}

#[async_trait]
impl Output for SqlOutput {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        Ok(self.init_output()?)
    }

    async fn connect(&mut self) -> Result<(), PluginError> {
        Ok(self.connect_output().await?)
    }

    async fn write(&mut self, metrics: &[Metric]) -> Result<(), PluginError> {
        Ok(self.write_metrics(metrics).await?)
    }

    async fn close(&mut self) -> Result<(), PluginError> {
        self.close_output().await;
        Ok(())
    }
}
