use thiserror::Error;

//create types errors for easy testability

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to read {path}: {source}")]
    ProcReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {field} from {path}: {raw}")]
    ParseError {
        path: String,
        field: String,
        raw: String,
    },

    #[error("input {input} timed out after {timeout_ms}ms")]
    Timeout { input: String, timeout_ms: u64 },
}

/// Failure reported by a database backend.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Unsupported(String),

    #[error("transaction already finished")]
    Finished,

    #[error("no statement prepared in transaction")]
    NotPrepared,

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("unknown driver {0:?}")]
    UnknownDriver(String),

    #[error("loading data source name secret failed: {0}")]
    Secret(String),

    #[error("output used before init")]
    NotInitialized,

    #[error("output is not connected")]
    NotConnected,

    #[error("creating database client failed: {0}")]
    Open(#[source] DriverError),

    #[error("pinging database failed: {0}")]
    Ping(#[source] DriverError),

    #[error("initializing database failed: {0}")]
    InitSql(#[source] DriverError),

    #[error("creating table failed: {0}")]
    CreateTable(#[source] DriverError),

    #[error("creating column failed: {0}")]
    CreateColumn(#[source] DriverError),

    #[error("fetching columns for table({table}) failed: {source}")]
    ListColumns { table: String, source: DriverError },

    #[error("begin failed: {0}")]
    Begin(#[source] DriverError),

    #[error("prepare failed: {0}")]
    Prepare(#[source] DriverError),

    #[error("execution failed: {0}")]
    Execute(#[source] DriverError),

    #[error("execution failed: {source}, unable to rollback: {rollback}")]
    Rollback {
        source: DriverError,
        rollback: DriverError,
    },

    #[error("tx commit failed: {0}")]
    Commit(#[source] DriverError),

    #[error("failed to send a batched tx: {0}")]
    Batch(#[source] Box<SqlError>),
}

/// Error surfaced through the plugin traits.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}
