//! Table and column reconciliation.
//!
//! Before a row is inserted its table must exist and, when a column update
//! template is configured, every column of the row must exist too. Known
//! tables and columns are remembered in a [`SchemaCache`] that lives as long as
//! the connection; changes made behind our back are only noticed when a later
//! statement fails.

use super::backend::Database;
use super::statement::{quote_ident, quote_str, sanitize, Column, ColumnKind};
use crate::errors::SqlError;
use crate::metric::{FieldValue, Metric};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// How unsigned integers are spelled in column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStyle {
    /// `<integer> <unsigned>`, e.g. `INT UNSIGNED`
    #[default]
    UnsignedSuffix,
    /// `<unsigned>` on its own, e.g. `UInt64`
    Literal,
}

/// SQL type names used when creating tables and columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TypeMapping {
    pub integer: String,
    pub real: String,
    pub text: String,
    pub timestamp: String,
    #[serde(rename = "defaultvalue")]
    pub default_value: String,
    pub unsigned: String,
    pub bool: String,
    pub conversion_style: ConversionStyle,
}

impl Default for TypeMapping {
    fn default() -> Self {
        Self {
            integer: "INT".into(),
            real: "DOUBLE".into(),
            text: "TEXT".into(),
            timestamp: "TIMESTAMP".into(),
            default_value: "TEXT".into(),
            unsigned: "UNSIGNED".into(),
            bool: "BOOL".into(),
            conversion_style: ConversionStyle::UnsignedSuffix,
        }
    }
}

impl TypeMapping {
    pub fn field_type(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Int(_) => self.integer.clone(),
            FieldValue::UInt(_) => match self.conversion_style {
                ConversionStyle::UnsignedSuffix => format!("{} {}", self.integer, self.unsigned),
                ConversionStyle::Literal => self.unsigned.clone(),
            },
            FieldValue::Float(_) => self.real.clone(),
            FieldValue::Str(_) => self.text.clone(),
            FieldValue::Bool(_) => self.bool.clone(),
            FieldValue::Json(v) => {
                tracing::warn!(value = %v, "unknown datatype, using default column type");
                self.default_value.clone()
            }
        }
    }

    pub fn column_type(&self, kind: ColumnKind<'_>) -> String {
        match kind {
            ColumnKind::Timestamp => self.timestamp.clone(),
            ColumnKind::Tag => self.text.clone(),
            ColumnKind::Field(value) => self.field_type(value),
        }
    }
}

/// Known tables and their columns.
///
/// Names are stored sanitized, the way the database holds them; lookups take
/// the metric's raw names.
#[derive(Debug, Default, Clone)]
pub struct SchemaCache {
    tables: HashMap<String, HashSet<String>>,
}

impl SchemaCache {
    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(&sanitize(table))
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(&sanitize(table))
            .is_some_and(|columns| columns.contains(&sanitize(column)))
    }

    pub fn insert_table(&mut self, table: &str) {
        self.tables.entry(sanitize(table)).or_default();
    }

    pub fn add_columns<I>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.tables
            .entry(sanitize(table))
            .or_default()
            .extend(columns.into_iter().map(|c| sanitize(&c)));
    }

    pub fn columns(&self, table: &str) -> Option<&HashSet<String>> {
        self.tables.get(&sanitize(table))
    }
}

/// Statement templates after dialect defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTemplates {
    pub create_table: String,
    pub table_exists: String,
    /// `None` disables schema evolution.
    pub add_column: Option<String>,
    pub list_columns: String,
}

pub struct SchemaManager {
    templates: SchemaTemplates,
    timestamp_column: Option<String>,
    types: TypeMapping,
    cache: SchemaCache,
}

impl SchemaManager {
    pub fn new(
        templates: SchemaTemplates,
        timestamp_column: Option<String>,
        types: TypeMapping,
        cache: SchemaCache,
    ) -> Self {
        Self {
            templates,
            timestamp_column,
            types,
            cache,
        }
    }

    pub fn evolution_enabled(&self) -> bool {
        self.templates.add_column.is_some()
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn create_table_sql(&self, metric: &Metric) -> String {
        let mut columns = Vec::with_capacity(metric.tags().len() + metric.fields().len() + 1);
        let mut tag_columns = Vec::with_capacity(metric.tags().len());

        if let Some(ts) = &self.timestamp_column {
            columns.push(format!("{} {}", quote_ident(ts), self.types.timestamp));
        }
        for (key, _) in metric.tags() {
            columns.push(format!("{} {}", quote_ident(key), self.types.text));
            tag_columns.push(quote_ident(key));
        }
        for (key, value) in metric.fields() {
            columns.push(format!("{} {}", quote_ident(key), self.types.field_type(value)));
        }

        self.templates
            .create_table
            .replace("{TABLE}", &quote_ident(metric.name()))
            .replace("{TABLELITERAL}", &quote_str(metric.name()))
            .replace("{COLUMNS}", &columns.join(","))
            .replace("{TAG_COLUMN_NAMES}", &tag_columns.join(","))
            .replace(
                "{TIMESTAMP_COLUMN_NAME}",
                &quote_ident(self.timestamp_column.as_deref().unwrap_or_default()),
            )
    }


    /// Create the metric's table unless the cache or the database already knows it.
    pub async fn ensure_table(&mut self, db: &dyn Database, metric: &Metric) -> Result<(), SqlError> {
        let table = metric.name();
        if self.cache.contains_table(table) {
            return Ok(());
        }

        if self.table_exists(db, table).await {
            self.cache.insert_table(table);
        } else {
            let sql = self.create_table_sql(metric);
            tracing::debug!(table, %sql, "creating table");
            db.execute(&sql, &[]).await.map_err(SqlError::CreateTable)?;
            self.cache.insert_table(table);
        }

        if self.evolution_enabled() {
            self.refresh_columns(db, table).await?;
        }
        Ok(())
    }

    /// Add every column of the row the cache doesn't know about yet.
    pub async fn ensure_columns(
        &mut self,
        db: &dyn Database,
        table: &str,
        columns: &[Column<'_>],
    ) -> Result<(), SqlError> {
        let Some(template) = self.templates.add_column.clone() else {
            return Ok(());
        };
        if !self.cache.contains_table(table) {
            self.refresh_columns(db, table).await?;
        }

        for column in columns {
            if self.cache.has_column(table, column.name) {
                continue;
            }
            let column_type = self.types.column_type(column.kind);
            let sql = add_column_sql(&template, table, column.name, &column_type);
            tracing::debug!(table, column = column.name, %sql, "adding column");
            db.execute(&sql, &[]).await.map_err(SqlError::CreateColumn)?;
            self.refresh_columns(db, table).await?;
        }
        Ok(())
    }

    async fn table_exists(&self, db: &dyn Database, table: &str) -> bool {
        let sql = self
            .templates
            .table_exists
            .replace("{TABLE}", &quote_ident(table));
        db.execute(&sql, &[]).await.is_ok()
    }

    async fn refresh_columns(&mut self, db: &dyn Database, table: &str) -> Result<(), SqlError> {
        let sql = self
            .templates
            .list_columns
            .replace("{TABLE}", &quote_str(table));
        let columns = db
            .query_strings(&sql)
            .await
            .map_err(|source| SqlError::ListColumns {
                table: table.to_string(),
                source,
            })?;
        self.cache.add_columns(table, columns);
        Ok(())
    }
}

fn add_column_sql(template: &str, table: &str, column: &str, column_type: &str) -> String {
    template
        .replace("{TABLE}", &quote_ident(table))
        .replace("{TABLELITERAL}", &quote_str(table))
        .replace("{COLUMN}", &format!("{} {}", quote_ident(column), column_type))
}
