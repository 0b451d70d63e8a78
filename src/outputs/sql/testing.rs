//! In-memory stand-in for a database that records every call.

use super::backend::{Connector, Database, PoolSettings, SqlValue, Transaction};
use super::dialect::Driver;
use crate::errors::DriverError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ping,
    Execute(String, Vec<SqlValue>),
    Query(String),
    Begin,
    Prepare(String),
    ExecutePrepared(Vec<SqlValue>),
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    tables: HashMap<String, Vec<String>>,
    fail_on: Vec<String>,
    fail_prepared_at: Option<usize>,
    fail_rollback: bool,
}

/// Understands just enough SQL to track created tables and columns.
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<State>>,
}

impl MockDatabase {
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.lock().tables.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Fail every statement or query containing `needle`.
    pub fn fail_on(self, needle: &str) -> Self {
        self.lock().fail_on.push(needle.to_string());
        self
    }

    /// Fail the n-th (zero-based) prepared execution of each transaction.
    pub fn fail_prepared_at(self, index: usize) -> Self {
        self.lock().fail_prepared_at = Some(index);
        self
    }

    pub fn fail_rollback(self) -> Self {
        self.lock().fail_rollback = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn check(state: &State, sql: &str) -> Result<(), DriverError> {
        match state.fail_on.iter().find(|needle| sql.contains(needle.as_str())) {
            Some(needle) => Err(DriverError::Other(format!("injected failure on {needle:?}"))),
            None => Ok(()),
        }
    }
}

/// Double-quoted identifiers in order of appearance, unescaped.
fn quoted_idents(sql: &str) -> Vec<String> {
    let mut idents = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut ident = String::new();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    ident.push('"');
                    continue;
                }
                break;
            }
            ident.push(c);
        }
        idents.push(ident);
    }
    idents
}

fn string_literal(sql: &str) -> Option<String> {
    let start = sql.find('\'')?;
    let end = sql.rfind('\'')?;
    (end > start).then(|| sql[start + 1..end].replace("''", "'"))
}

#[async_trait]
impl Database for MockDatabase {
    async fn ping(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.calls.push(Call::Ping);
        Self::check(&state, "PING")
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.calls.push(Call::Execute(sql.to_string(), params.to_vec()));
        Self::check(&state, sql)?;

        let idents = quoted_idents(sql);
        if sql.starts_with("SELECT 1 FROM") || sql.starts_with("SELECT TOP(1)") {
            let known = idents.first().is_some_and(|t| state.tables.contains_key(t));
            if !known {
                return Err(DriverError::Other("no such table".into()));
            }
        } else if sql.starts_with("CREATE TABLE") {
            if let Some((table, rest)) = idents.split_first() {
                let mut columns: Vec<String> = Vec::new();
                for column in rest {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
                state.tables.insert(table.clone(), columns);
            }
        } else if sql.starts_with("ALTER TABLE") {
            if let [table, column, ..] = idents.as_slice() {
                if let Some(columns) = state.tables.get_mut(table) {
                    columns.push(column.clone());
                }
            }
        }
        Ok(())
    }

    async fn query_strings(&self, sql: &str) -> Result<Vec<String>, DriverError> {
        let mut state = self.lock();
        state.calls.push(Call::Query(sql.to_string()));
        Self::check(&state, sql)?;
        Ok(string_literal(sql)
            .and_then(|table| state.tables.get(&table).cloned())
            .unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
        let mut state = self.lock();
        state.calls.push(Call::Begin);
        Self::check(&state, "BEGIN")?;
        Ok(Box::new(MockTransaction {
            db: self.clone(),
            executed: 0,
        }))
    }

    async fn close(&self) {
        self.lock().calls.push(Call::Close);
    }
}

struct MockTransaction {
    db: MockDatabase,
    executed: usize,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn prepare(&mut self, sql: &str) -> Result<(), DriverError> {
        let mut state = self.db.lock();
        state.calls.push(Call::Prepare(sql.to_string()));
        MockDatabase::check(&state, "PREPARE")
    }

    async fn execute_prepared(&mut self, params: &[SqlValue]) -> Result<(), DriverError> {
        let mut state = self.db.lock();
        state.calls.push(Call::ExecutePrepared(params.to_vec()));
        let index = self.executed;
        self.executed += 1;
        if state.fail_prepared_at == Some(index) {
            return Err(DriverError::Other(format!("injected failure on row {index}")));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        let mut state = self.db.lock();
        state.calls.push(Call::Commit);
        MockDatabase::check(&state, "COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        let mut state = self.db.lock();
        state.calls.push(Call::Rollback);
        if state.fail_rollback {
            return Err(DriverError::Other("injected rollback failure".into()));
        }
        Ok(())
    }
}

/// Hands out clones of one [`MockDatabase`] and remembers the DSNs it saw.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub db: MockDatabase,
    dsns: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(db: MockDatabase) -> Self {
        Self {
            db,
            dsns: Arc::default(),
        }
    }

    pub fn dsns(&self) -> Vec<String> {
        self.dsns.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _driver: Driver,
        dsn: &str,
        _settings: &PoolSettings,
    ) -> Result<Box<dyn Database>, DriverError> {
        self.dsns.lock().unwrap().push(dsn.to_string());
        Ok(Box::new(self.db.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_idents_unescape() {
        assert_eq!(
            quoted_idents("ALTER TABLE \"a\"\"b\" ADD COLUMN \"c\" INT"),
            vec!["a\"b".to_string(), "c".to_string()]
        );
        assert_eq!(string_literal("WHERE x='it''s'"), Some("it's".to_string()));
    }
}
