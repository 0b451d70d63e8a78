use super::backend::{Database, SqlValue};
use super::dialect::Dialect;
use crate::errors::SqlError;
use std::collections::HashMap;

/// Rows waiting to be written, grouped by insert statement.
///
/// Rows inside a group keep their arrival order; groups themselves come out
/// in no particular order.
#[derive(Debug, Default)]
pub struct PendingBatch {
    groups: HashMap<String, Vec<Vec<SqlValue>>>,
}

impl PendingBatch {
    pub fn push(&mut self, sql: &str, params: Vec<SqlValue>) {
        match self.groups.get_mut(sql) {
            Some(rows) => rows.push(params),
            None => {
                self.groups.insert(sql.to_string(), vec![params]);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn statements(&self) -> usize {
        self.groups.len()
    }

    pub fn rows(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn into_groups(self) -> impl Iterator<Item = (String, Vec<Vec<SqlValue>>)> {
        self.groups.into_iter()
    }
}

/// Insert a single row right away.
pub async fn send_unprepared(
    db: &dyn Database,
    dialect: &Dialect,
    sql: &str,
    params: &[SqlValue],
) -> Result<(), SqlError> {
    if !dialect.transactional_inserts {
        return db.execute(sql, params).await.map_err(SqlError::Execute);
    }

    // the driver only accepts inserts as prepared statements inside a transaction
    let mut tx = db.begin().await.map_err(SqlError::Begin)?;
    tx.prepare(sql).await.map_err(SqlError::Prepare)?;
    tx.execute_prepared(params).await.map_err(SqlError::Execute)?;
    tx.commit().await.map_err(SqlError::Commit)
}

/// Insert all rows of one statement inside a single transaction.
pub async fn send_prepared(
    db: &dyn Database,
    sql: &str,
    rows: &[Vec<SqlValue>],
) -> Result<(), SqlError> {
    let mut tx = db.begin().await.map_err(SqlError::Begin)?;
    tx.prepare(sql).await.map_err(SqlError::Prepare)?;

    for params in rows {
        if let Err(source) = tx.execute_prepared(params).await {
            return match tx.rollback().await {
                Ok(()) => Err(SqlError::Execute(source)),
                Err(rollback) => Err(SqlError::Rollback { source, rollback }),
            };
        }
    }

    tx.commit().await.map_err(SqlError::Commit)
}
