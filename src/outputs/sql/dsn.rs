use std::collections::BTreeMap;
use url::{form_urlencoded, Position, Url};

const DROPPED_PARAMS: [&str; 5] = [
    "tls_config",
    "no_delay",
    "write_timeout",
    "block_size",
    "check_connection_liveness",
];

/// Rewrite a ClickHouse DSN using legacy (v1 client) parameters into the
/// current format. DSNs that don't parse as URLs are returned unchanged.
pub fn convert_clickhouse_dsn(dsn: &str) -> String {
    let Ok(url) = Url::parse(dsn) else {
        return dsn.to_string();
    };

    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

    for name in DROPPED_PARAMS {
        if params.remove(name).is_some() {
            tracing::warn!(param = name, "DSN parameter is no longer supported and was dropped");
        }
    }

    if params.get("connection_open_strategy").map(String::as_str) == Some("time_random") {
        tracing::warn!("DSN parameter 'connection_open_strategy' can no longer be 'time_random'");
    }

    if let Some(timeout) = params.get_mut("read_timeout") {
        if timeout.parse::<f64>().is_ok() {
            tracing::warn!("legacy DSN parameter 'read_timeout' interpreted as seconds");
            timeout.push('s');
        }
    }

    let mut path = url.path().to_string();
    if let Some(database) = params.remove("database").filter(|d| !d.is_empty()) {
        tracing::warn!("legacy DSN parameter 'database' moved into the path");
        path = format!("/{database}");
    }

    let mut authority = url[Position::BeforeUsername..Position::AfterPort].to_string();
    if let Some(alt_hosts) = params.remove("alt_hosts").filter(|h| !h.is_empty()) {
        tracing::warn!("legacy DSN parameter 'alt_hosts' moved into the host list");
        authority.push(',');
        authority.push_str(&alt_hosts);
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&params)
        .finish();

    let mut converted = format!("{}://{}{}", url.scheme(), authority, path);
    if !query.is_empty() {
        converted.push('?');
        converted.push_str(&query);
    }
    converted
}
