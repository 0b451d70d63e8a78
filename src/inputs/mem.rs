use super::{read_proc, Input};
use crate::errors::CollectorError;
use crate::metric::Metric;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Memory and swap usage from /proc/meminfo.
#[derive(Debug, Default)]
pub struct MemInput;

impl MemInput {
    pub fn new() -> Self {
        Self
    }
}

/// `Key:   123 kB` lines as byte counts.
fn parse_meminfo(content: &str) -> HashMap<&str, u64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), kb * 1024))
        })
        .collect()
}

fn required(map: &HashMap<&str, u64>, field: &str) -> Result<u64, CollectorError> {
    map.get(field).copied().ok_or_else(|| CollectorError::ParseError {
        path: MEMINFO_PATH.into(),
        field: field.into(),
        raw: "field not found".into(),
    })
}

fn mem_metric(content: &str) -> Result<Metric, CollectorError> {
    let map = parse_meminfo(content);
    let total = required(&map, "MemTotal")?;
    let available = required(&map, "MemAvailable")?;
    let swap_total = map.get("SwapTotal").copied().unwrap_or(0);
    let swap_free = map.get("SwapFree").copied().unwrap_or(0);

    let used = total.saturating_sub(available);
    let used_percent = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok(Metric::new("mem", Utc::now())
        .with_field("total", total)
        .with_field("available", available)
        .with_field("used", used)
        .with_field("used_percent", used_percent)
        .with_field("swap_total", swap_total)
        .with_field("swap_used", swap_total.saturating_sub(swap_free)))
}

#[async_trait]
impl Input for MemInput {
    fn name(&self) -> &'static str {
        "mem"
    }

    async fn gather(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let content = read_proc(MEMINFO_PATH).await?;
        Ok(vec![mem_metric(&content)?])
    }
}
