use super::{read_proc, Input};
use crate::errors::CollectorError;
use crate::metric::Metric;
use async_trait::async_trait;
use chrono::Utc;

const STAT_PATH: &str = "/proc/stat";
const LOADAVG_PATH: &str = "/proc/loadavg";

/// Aggregate CPU usage from /proc/stat plus load averages from /proc/loadavg.
///
/// Usage is a delta between two gathers, so the first gather only records a
/// baseline and reports the `system` metric alone.
#[derive(Debug, Default)]
pub struct CpuInput {
    prev: Option<CpuTimes>,
}

/// Cumulative tick counters of the aggregate `cpu` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn parse(line: &str) -> Result<Self, CollectorError> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("cpu") {
            return Err(parse_error("cpu", line));
        }

        const NAMES: [&str; 8] = [
            "user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal",
        ];
        let mut ticks = [0u64; 8];
        for (slot, name) in ticks.iter_mut().zip(NAMES) {
            let raw = parts.next().ok_or_else(|| parse_error(name, line))?;
            *slot = raw.parse().map_err(|_| parse_error(name, raw))?;
        }
        let [user, nice, system, idle, iowait, irq, softirq, steal] = ticks;

        Ok(Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        })
    }
}

/// Percentages spent in each state between two samples.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CpuUsage {
    user: f64,
    system: f64,
    iowait: f64,
    idle: f64,
}

impl CpuUsage {
    fn between(prev: &CpuTimes, cur: &CpuTimes) -> Self {
        let total = cur.total().saturating_sub(prev.total());
        if total == 0 {
            return Self {
                user: 0.0,
                system: 0.0,
                iowait: 0.0,
                idle: 100.0,
            };
        }
        let pct = |ticks: u64| ticks as f64 / total as f64 * 100.0;
        Self {
            user: pct(cur.user.saturating_sub(prev.user) + cur.nice.saturating_sub(prev.nice)),
            system: pct(
                cur.system.saturating_sub(prev.system)
                    + cur.irq.saturating_sub(prev.irq)
                    + cur.softirq.saturating_sub(prev.softirq),
            ),
            iowait: pct(cur.iowait.saturating_sub(prev.iowait)),
            idle: pct(cur.idle.saturating_sub(prev.idle)),
        }
    }
}

fn parse_error(field: &str, raw: &str) -> CollectorError {
    CollectorError::ParseError {
        path: STAT_PATH.into(),
        field: field.into(),
        raw: raw.into(),
    }
}

/// Lines like `cpu0`, `cpu1`, ... one per core.
fn count_cores(stat: &str) -> u64 {
    stat.lines()
        .filter(|line| {
            line.strip_prefix("cpu")
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_digit())
        })
        .count() as u64
}

fn parse_loadavg(content: &str) -> Result<[f64; 3], CollectorError> {
    let mut loads = [0.0; 3];
    let mut parts = content.split_whitespace();
    for (slot, name) in loads.iter_mut().zip(["load1", "load5", "load15"]) {
        let raw = parts.next().unwrap_or_default();
        *slot = raw.parse().map_err(|_| CollectorError::ParseError {
            path: LOADAVG_PATH.into(),
            field: name.into(),
            raw: content.trim().to_string(),
        })?;
    }
    Ok(loads)
}

impl CpuInput {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Input for CpuInput {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn gather(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let stat = read_proc(STAT_PATH).await?;
        let first = stat.lines().next().unwrap_or_default();
        let current = CpuTimes::parse(first)?;
        let [load1, load5, load15] = parse_loadavg(&read_proc(LOADAVG_PATH).await?)?;

        let now = Utc::now();
        let mut metrics = Vec::with_capacity(2);

        if let Some(prev) = self.prev.replace(current) {
            let usage = CpuUsage::between(&prev, &current);
            metrics.push(
                Metric::new("cpu", now)
                    .with_tag("cpu", "cpu-total")
                    .with_field("usage_user", usage.user)
                    .with_field("usage_system", usage.system)
                    .with_field("usage_iowait", usage.iowait)
                    .with_field("usage_idle", usage.idle),
            );
        }

        metrics.push(
            Metric::new("system", now)
                .with_field("load1", load1)
                .with_field("load5", load5)
                .with_field("load15", load15)
                .with_field("n_cpus", count_cores(&stat)),
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0
cpu1 1335498 35507 523368 13200746 4990 0 3670 0 0 0
intr 1462898 0 0";

    fn times(user: u64, system: u64, idle: u64, iowait: u64) -> CpuTimes {
        CpuTimes {
            user,
            nice: 0,
            system,
            idle,
            iowait,
            irq: 0,
            softirq: 0,
            steal: 0,
        }
    }

    #[test]
    fn test_parse_cpu_line() {
        let t = CpuTimes::parse(SAMPLE_STAT.lines().next().unwrap()).unwrap();
        assert_eq!(t.user, 10132153);
        assert_eq!(t.nice, 290696);
        assert_eq!(t.idle, 46828483);
        assert_eq!(t.iowait, 16683);
        assert_eq!(t.softirq, 25195);
    }

    #[test]
    fn test_parse_rejects_short_or_foreign_lines() {
        assert!(CpuTimes::parse("cpu  100 200").is_err());
        assert!(CpuTimes::parse("cpu0 1 2 3 4 5 6 7 8").is_err());
        assert!(CpuTimes::parse("cpu 1 2 x 4 5 6 7 8").is_err());
    }

    #[test]
    fn test_count_cores() {
        assert_eq!(count_cores(SAMPLE_STAT), 2);
    }

    #[test]
    fn test_parse_loadavg() {
        let [l1, l5, l15] = parse_loadavg("0.50 0.75 1.00 2/1234 5678").unwrap();
        assert!((l1 - 0.50).abs() < f64::EPSILON);
        assert!((l5 - 0.75).abs() < f64::EPSILON);
        assert!((l15 - 1.00).abs() < f64::EPSILON);
        assert!(parse_loadavg("0.5").is_err());
    }

    #[test]
    fn test_usage_between_samples() {
        let usage = CpuUsage::between(&times(1000, 500, 8000, 100), &times(1200, 600, 8100, 100));
        assert!((usage.user - 50.0).abs() < f64::EPSILON);
        assert!((usage.system - 25.0).abs() < f64::EPSILON);
        assert!((usage.idle - 25.0).abs() < f64::EPSILON);
        assert_eq!(usage.iowait, 0.0);
    }

    #[test]
    fn test_usage_without_progress_is_idle() {
        let t = times(1, 1, 1, 1);
        assert_eq!(CpuUsage::between(&t, &t).idle, 100.0);
    }
}
