use crate::errors::SqlError;
use std::fmt;
use std::str::FromStr;

/// Database drivers the SQL output knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    ClickHouse,
    MsSql,
    MySql,
    Pgx,
    Snowflake,
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClickHouse => "clickhouse",
            Self::MsSql => "mssql",
            Self::MySql => "mysql",
            Self::Pgx => "pgx",
            Self::Snowflake => "snowflake",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn dialect(self) -> Dialect {
        let base = Dialect {
            driver: self,
            placeholder: Placeholder::QuestionMark,
            transactional_inserts: false,
            table_template: "CREATE TABLE {TABLE}({COLUMNS})",
            exists_template: "SELECT 1 FROM {TABLE} LIMIT 1",
            list_columns_template:
                "SELECT column_name FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME={TABLE}",
        };

        match self {
            Self::ClickHouse => Dialect {
                transactional_inserts: true,
                table_template:
                    "CREATE TABLE {TABLE}({COLUMNS}) ORDER BY ({TAG_COLUMN_NAMES}, {TIMESTAMP_COLUMN_NAME})",
                ..base
            },
            Self::MsSql => Dialect {
                exists_template: "SELECT TOP(1) 1 FROM {TABLE}",
                ..base
            },
            Self::Pgx => Dialect {
                placeholder: Placeholder::Numbered,
                list_columns_template:
                    "SELECT column_name::text FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME={TABLE}",
                ..base
            },
            Self::Sqlite => Dialect {
                list_columns_template: "SELECT name AS column_name FROM pragma_table_info({TABLE})",
                ..base
            },
            Self::MySql | Self::Snowflake => base,
        }
    }
}

impl FromStr for Driver {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clickhouse" => Ok(Self::ClickHouse),
            "mssql" => Ok(Self::MsSql),
            "mysql" => Ok(Self::MySql),
            "pgx" => Ok(Self::Pgx),
            "snowflake" => Ok(Self::Snowflake),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SqlError::UnknownDriver(other.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bind-parameter syntax used in generated statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1, $2, ...`
    Numbered,
    /// `?, ?, ...`
    QuestionMark,
}

impl Placeholder {
    /// Placeholder for the zero-based parameter `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            Self::Numbered => format!("${}", index + 1),
            Self::QuestionMark => "?".to_string(),
        }
    }
}

/// Everything that differs between databases, gathered in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub driver: Driver,
    pub placeholder: Placeholder,
    /// Even single-row inserts go through begin/prepare/exec/commit.
    pub transactional_inserts: bool,
    pub table_template: &'static str,
    pub exists_template: &'static str,
    pub list_columns_template: &'static str,
}
