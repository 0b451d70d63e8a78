use super::{Connector, Database, PoolSettings, SqlValue, Transaction};
use crate::errors::DriverError;
use crate::outputs::sql::dialect::Driver;
use async_trait::async_trait;
use sqlx::mysql::MySql;
use sqlx::pool::PoolOptions;
use sqlx::postgres::Postgres;
use sqlx::query::Query;
use sqlx::sqlite::Sqlite;
use sqlx::{Connection as _, Executor as _, Pool};

type BackendQuery<'q, DB> = Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>;

fn signed(value: u64) -> Result<i64, DriverError> {
    i64::try_from(value).map_err(|_| {
        DriverError::Unsupported(format!(
            "unsigned value {value} does not fit a signed 64-bit parameter"
        ))
    })
}

fn bind_postgres<'q>(
    query: BackendQuery<'q, Postgres>,
    value: &SqlValue,
) -> Result<BackendQuery<'q, Postgres>, DriverError> {
    Ok(match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(signed(*v)?),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.to_string()),
    })
}

fn bind_mysql<'q>(
    query: BackendQuery<'q, MySql>,
    value: &SqlValue,
) -> Result<BackendQuery<'q, MySql>, DriverError> {
    Ok(match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.to_string()),
    })
}

fn bind_sqlite<'q>(
    query: BackendQuery<'q, Sqlite>,
    value: &SqlValue,
) -> Result<BackendQuery<'q, Sqlite>, DriverError> {
    Ok(match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(signed(*v)?),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.to_string()),
    })
}

// The three sqlx backends only differ in their database type and bind rules.
macro_rules! sqlx_backend {
    ($(#[$meta:meta])* $name:ident, $tx:ident, $db:ty, $bind:ident) => {
        $(#[$meta])*
        pub struct $name {
            pool: Pool<$db>,
        }

        impl $name {
            pub fn new(pool: Pool<$db>) -> Self {
                Self { pool }
            }
        }

        #[async_trait]
        impl Database for $name {
            async fn ping(&self) -> Result<(), DriverError> {
                let mut conn = self.pool.acquire().await?;
                conn.ping().await?;
                Ok(())
            }

            async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<(), DriverError> {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = $bind(query, param)?;
                }
                query.execute(&self.pool).await?;
                Ok(())
            }

            async fn query_strings(&self, sql: &str) -> Result<Vec<String>, DriverError> {
                let values = sqlx::query_scalar::<_, String>(sql)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(values)
            }

            async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
                let tx = self.pool.begin().await?;
                Ok(Box::new($tx {
                    tx: Some(tx),
                    statement: None,
                }))
            }

            async fn close(&self) {
                self.pool.close().await;
            }
        }

        struct $tx {
            tx: Option<sqlx::Transaction<'static, $db>>,
            statement: Option<String>,
        }

        #[async_trait]
        impl Transaction for $tx {
            async fn prepare(&mut self, sql: &str) -> Result<(), DriverError> {
                let tx = self.tx.as_mut().ok_or(DriverError::Finished)?;
                // sqlx keeps the prepared statement cached on the connection,
                // later executions of the same text reuse it.
                (&mut **tx).prepare(sql).await?;
                self.statement = Some(sql.to_string());
                Ok(())
            }

            async fn execute_prepared(&mut self, params: &[SqlValue]) -> Result<(), DriverError> {
                let tx = self.tx.as_mut().ok_or(DriverError::Finished)?;
                let sql = self.statement.as_deref().ok_or(DriverError::NotPrepared)?;
                let mut query = sqlx::query(sql);
                for param in params {
                    query = $bind(query, param)?;
                }
                query.execute(&mut **tx).await?;
                Ok(())
            }

            async fn commit(&mut self) -> Result<(), DriverError> {
                let tx = self.tx.take().ok_or(DriverError::Finished)?;
                tx.commit().await?;
                Ok(())
            }

            async fn rollback(&mut self) -> Result<(), DriverError> {
                let tx = self.tx.take().ok_or(DriverError::Finished)?;
                tx.rollback().await?;
                Ok(())
            }
        }
    };
}

sqlx_backend!(
    /// Postgres through sqlx (`pgx` driver).
    PostgresDatabase,
    PostgresTransaction,
    Postgres,
    bind_postgres
);

sqlx_backend!(
    /// MySQL / MariaDB through sqlx.
    MySqlDatabase,
    MySqlTransaction,
    MySql,
    bind_mysql
);

sqlx_backend!(
    /// SQLite through sqlx.
    SqliteDatabase,
    SqliteTransaction,
    Sqlite,
    bind_sqlite
);

fn pool_options<DB: sqlx::Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    let mut options = PoolOptions::<DB>::new()
        .idle_timeout(settings.max_idle_time)
        .max_lifetime(settings.max_lifetime);
    if let Some(max_open) = settings.max_open {
        options = options.max_connections(max_open);
    }
    options
}

/// Opens sqlx pools for the drivers sqlx supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(
        &self,
        driver: Driver,
        dsn: &str,
        settings: &PoolSettings,
    ) -> Result<Box<dyn Database>, DriverError> {
        if let Some(max_idle) = settings.max_idle {
            tracing::debug!(
                max_idle,
                "sqlx pools do not cap idle connections; relying on idle timeout"
            );
        }

        match driver {
            Driver::Pgx => {
                let pool = pool_options::<Postgres>(settings).connect_lazy(dsn)?;
                Ok(Box::new(PostgresDatabase::new(pool)))
            }
            Driver::MySql => {
                let pool = pool_options::<MySql>(settings).connect_lazy(dsn)?;
                Ok(Box::new(MySqlDatabase::new(pool)))
            }
            Driver::Sqlite => {
                let pool = pool_options::<Sqlite>(settings).connect_lazy(dsn)?;
                Ok(Box::new(SqliteDatabase::new(pool)))
            }
            Driver::ClickHouse | Driver::MsSql | Driver::Snowflake => {
                Err(DriverError::Unsupported(format!(
                    "no bundled client for driver {driver}, supply a custom connector"
                )))
            }
        }
    }
}
