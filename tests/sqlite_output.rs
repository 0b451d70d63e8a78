// SQL output against a real SQLite database file.

use chrono::{TimeZone, Utc};
use sql_metrics_agent::errors::SqlError;
use sql_metrics_agent::metric::Metric;
use sql_metrics_agent::outputs::sql::{Secret, SqlConfig, SqlOutput};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const ADD_COLUMN: &str = "ALTER TABLE {TABLE} ADD COLUMN {COLUMN}";

fn dsn(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("metrics.db").display())
}

fn config(dir: &TempDir) -> SqlConfig {
    SqlConfig {
        driver: "sqlite".into(),
        data_source_name: Secret::new(dsn(dir)),
        ..Default::default()
    }
}

async fn connect(config: SqlConfig) -> SqlOutput {
    let mut output = SqlOutput::new(config);
    assert_ok!(output.init_output());
    assert_ok!(output.connect_output().await);
    output
}

fn cpu_batch() -> Vec<Metric> {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    vec![
        Metric::new("cpu", ts)
            .with_tag("host", "a")
            .with_field("usage", 42.0),
        Metric::new("cpu", ts)
            .with_tag("host", "b")
            .with_field("usage", 43.0)
            .with_field("idle", 10.0),
    ]
}

async fn idle_of(pool: &SqlitePool, host: &str) -> Option<f64> {
    sqlx::query_scalar("SELECT \"idle\" FROM \"cpu\" WHERE \"host\" = ?")
        .bind(host)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_schema_evolution_with_unprepared_inserts() {
    let dir = TempDir::new().unwrap();
    let mut output = connect(SqlConfig {
        table_update_template: ADD_COLUMN.into(),
        ..config(&dir)
    })
    .await;

    assert_ok!(output.write_metrics(&cpu_batch()).await);
    assert!(output.schema_cache().unwrap().has_column("cpu", "idle"));
    output.close_output().await;

    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "cpu").await, 2);
    assert_eq!(idle_of(&pool, "a").await, None);
    assert_eq!(idle_of(&pool, "b").await, Some(10.0));
}

#[tokio::test]
async fn test_schema_evolution_with_prepared_transactions() {
    let dir = TempDir::new().unwrap();
    let mut output = connect(SqlConfig {
        table_update_template: ADD_COLUMN.into(),
        prepare_write_tx: true,
        ..config(&dir)
    })
    .await;

    let mut batch = cpu_batch();
    batch.push(
        Metric::new("mem", Utc::now())
            .with_field("used", 1024u64)
            .with_field("swapping", false),
    );
    assert_ok!(output.write_metrics(&batch).await);
    output.close_output().await;

    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "cpu").await, 2);
    assert_eq!(count(&pool, "mem").await, 1);
    assert_eq!(idle_of(&pool, "b").await, Some(10.0));
}

#[tokio::test]
async fn test_reconnect_reuses_existing_table() {
    let dir = TempDir::new().unwrap();
    let evolving = SqlConfig {
        table_update_template: ADD_COLUMN.into(),
        ..config(&dir)
    };

    let mut first = connect(evolving.clone()).await;
    assert_ok!(first.write_metrics(&cpu_batch()).await);
    first.close_output().await;

    // fresh caches: the table is found by probing, columns by listing
    let mut second = connect(evolving).await;
    let next = Metric::new("cpu", Utc::now())
        .with_tag("host", "c")
        .with_tag("region", "eu")
        .with_field("usage", 1.0);
    assert_ok!(second.write_metrics(&[next]).await);
    let cache = second.schema_cache().unwrap();
    assert!(cache.has_column("cpu", "idle"));
    assert!(cache.has_column("cpu", "region"));
    second.close_output().await;

    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "cpu").await, 3);
}

#[tokio::test]
async fn test_new_field_without_evolution_fails_insert() {
    let dir = TempDir::new().unwrap();
    let mut output = connect(config(&dir)).await;

    let err = assert_err!(output.write_metrics(&cpu_batch()).await);
    assert!(matches!(err, SqlError::Execute(_)), "{err}");
    output.close_output().await;

    // the first row went in before the failing one
    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "cpu").await, 1);
}

#[tokio::test]
async fn test_init_sql_and_json_fields() {
    let dir = TempDir::new().unwrap();
    let mut output = connect(SqlConfig {
        init_sql: "CREATE TABLE IF NOT EXISTS \"bootstrap\" (\"id\" INTEGER)".into(),
        timestamp_column: String::new(),
        ..config(&dir)
    })
    .await;

    let gpu = Metric::new("gpu", Utc::now())
        .with_tag("card", "0")
        .with_field("clocks", serde_json::json!({"sclk": 1500, "mclk": 875}));
    assert_ok!(output.write_metrics(&[gpu]).await);
    output.close_output().await;

    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "bootstrap").await, 0);
    let clocks: String = sqlx::query_scalar("SELECT \"clocks\" FROM \"gpu\"")
        .fetch_one(&pool)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&clocks).unwrap();
    assert_eq!(parsed["sclk"], 1500);
}

#[tokio::test]
async fn test_sanitized_names_survive_schema_evolution() {
    let dir = TempDir::new().unwrap();
    let mut output = connect(SqlConfig {
        table_update_template: ADD_COLUMN.into(),
        ..config(&dir)
    })
    .await;

    let reading = |card: &str| {
        Metric::new("gpu\u{1F525}", Utc::now())
            .with_tag("a\u{0}b", card)
            .with_field("temp", 60i64)
    };
    assert_ok!(output.write_metrics(&[reading("0")]).await);
    assert_ok!(output.write_metrics(&[reading("1")]).await);
    let cache = output.schema_cache().unwrap();
    assert!(cache.has_column("gpu\u{1F525}", "timestamp"));
    assert!(cache.has_column("gpu\u{1F525}", "a\u{0}b"));
    output.close_output().await;

    let pool = SqlitePool::connect(&dsn(&dir)).await.unwrap();
    assert_eq!(count(&pool, "gpu_").await, 2);
    let cards: Vec<String> = sqlx::query_scalar("SELECT \"a_b\" FROM \"gpu_\" ORDER BY \"a_b\"")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(cards, vec!["0", "1"]);
}
