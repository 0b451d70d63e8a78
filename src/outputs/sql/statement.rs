use super::backend::SqlValue;
use super::dialect::Placeholder;
use crate::metric::{FieldValue, Metric};
use std::collections::HashMap;
use xxhash_rust::xxh3::Xxh3;

/// Quote a table or column name.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", sanitize(name).replace('"', "\"\""))
}

/// Quote a table or column name as a string literal, sanitized the same way
/// as [`quote_ident`] so it matches what the database stores.
pub fn quote_str(value: &str) -> String {
    format!("'{}'", sanitize(value).replace('\'', "''"))
}

/// The name as it ends up in the database: only characters in
/// U+0001..=U+FFFF survive, everything else becomes '_'.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\u{0001}'..='\u{FFFF}' => c,
            _ => '_',
        })
        .collect()
}

/// Where a column of a row comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind<'m> {
    Timestamp,
    Tag,
    Field(&'m FieldValue),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column<'m> {
    pub name: &'m str,
    pub kind: ColumnKind<'m>,
}

/// A metric laid out as one insert: ordered columns, matching parameters,
/// and the fingerprint of its column set.
#[derive(Debug, Clone)]
pub struct Row<'m> {
    pub fingerprint: u64,
    pub columns: Vec<Column<'m>>,
    pub params: Vec<SqlValue>,
}

impl<'m> Row<'m> {
    /// Columns are: timestamp (if configured), tags in order, fields sorted by key.
    pub fn from_metric(metric: &'m Metric, timestamp_column: Option<&'m str>) -> Self {
        let mut hasher = Xxh3::new();
        hash_part(&mut hasher, metric.name());

        let capacity =
            metric.tags().len() + metric.fields().len() + usize::from(timestamp_column.is_some());
        let mut columns = Vec::with_capacity(capacity);
        let mut params = Vec::with_capacity(capacity);

        if let Some(name) = timestamp_column {
            columns.push(Column {
                name,
                kind: ColumnKind::Timestamp,
            });
            params.push(SqlValue::Timestamp(metric.timestamp()));
        }

        for (key, value) in metric.tags() {
            hash_part(&mut hasher, key);
            columns.push(Column {
                name: key,
                kind: ColumnKind::Tag,
            });
            params.push(SqlValue::Text(value.clone()));
        }

        for (key, value) in metric.sorted_fields() {
            hash_part(&mut hasher, key);
            columns.push(Column {
                name: key,
                kind: ColumnKind::Field(value),
            });
            params.push(SqlValue::from(value));
        }

        Self {
            fingerprint: hasher.digest(),
            columns,
            params,
        }
    }
}

fn hash_part(hasher: &mut Xxh3, part: &str) {
    hasher.update(part.as_bytes());
    // separator keeps ("ab","c") and ("a","bc") apart
    hasher.update(&[0]);
}

/// `INSERT INTO "t" ("a","b") VALUES(?,?)`
pub fn insert_sql(table: &str, columns: &[Column<'_>], placeholder: Placeholder) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c.name)).collect();
    let placeholders: Vec<String> = (0..columns.len()).map(|i| placeholder.render(i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES({})",
        quote_ident(table),
        quoted.join(","),
        placeholders.join(",")
    )
}

/// Insert statements keyed by row fingerprint. Entries are never evicted.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: HashMap<u64, String>,
}

impl StatementCache {
    pub fn get_or_generate(&mut self, table: &str, row: &Row<'_>, placeholder: Placeholder) -> &str {
        self.statements
            .entry(row.fingerprint)
            .or_insert_with(|| insert_sql(table, &row.columns, placeholder))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
