use crate::outputs::sql::SqlConfig;
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "sql-metrics-agent", version, about)]
pub struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, env = "SQL_METRICS_AGENT_CONFIG", default_value = "agent.toml")]
    pub config: PathBuf,

    /// Enable JSON structured logging.
    #[arg(long, env = "SQL_METRICS_AGENT_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "SQL_METRICS_AGENT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Gather and flush once, then exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub inputs: InputsSection,
    #[serde(default)]
    pub outputs: OutputsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Collection interval in milliseconds.
    pub interval_ms: u64,
    /// Upper bound for a single input's gather, in milliseconds.
    pub gather_timeout_ms: u64,
    /// Value of the `host` tag. If none provided, default to hostname.
    pub hostname: Option<String>,
    /// Don't add a `host` tag at all.
    pub omit_hostname: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            gather_timeout_ms: 5_000,
            hostname: None,
            omit_hostname: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputsSection {
    pub cpu: bool,
    pub mem: bool,
}

impl Default for InputsSection {
    fn default() -> Self {
        Self {
            cpu: true,
            mem: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputsSection {
    pub sql: Option<SqlConfig>,
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl AgentSection {
    /// get host tag value, upon failure fallback to "unknown-host".
    pub fn resolved_hostname(&self) -> Option<String> {
        if self.omit_hostname {
            return None;
        }
        let host = self.hostname.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown-host".to_string())
        });
        Some(host)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_millis(self.gather_timeout_ms)
    }
}
