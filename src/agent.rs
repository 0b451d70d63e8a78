use crate::config::AgentConfig;
use crate::errors::{CollectorError, PluginError};
use crate::inputs::cpu::CpuInput;
use crate::inputs::mem::MemInput;
use crate::inputs::Input;
use crate::metric::Metric;
use crate::outputs::sql::SqlOutput;
use crate::outputs::Output;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Polls inputs on an interval and hands each batch to every output.
pub struct Agent {
    inputs: Vec<Box<dyn Input>>,
    outputs: Vec<Box<dyn Output>>,
    interval: Duration,
    gather_timeout: Duration,
    global_tags: Vec<(String, String)>,
}

impl Agent {
    pub fn new(interval: Duration, gather_timeout: Duration) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            interval,
            gather_timeout,
            global_tags: Vec::new(),
        }
    }

    /// Wire up the inputs and outputs enabled in `config`.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut agent = Self::new(config.agent.interval(), config.agent.gather_timeout());
        if let Some(host) = config.agent.resolved_hostname() {
            agent = agent.with_global_tag("host", host);
        }
        if config.inputs.cpu {
            agent = agent.with_input(Box::new(CpuInput::new()));
        }
        if config.inputs.mem {
            agent = agent.with_input(Box::new(MemInput::new()));
        }
        if let Some(sql) = &config.outputs.sql {
            agent = agent.with_output(Box::new(SqlOutput::new(sql.clone())));
        }
        agent
    }

    pub fn with_input(mut self, input: Box<dyn Input>) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: Box<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Tag added to every gathered metric.
    pub fn with_global_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_tags.push((key.into(), value.into()));
        self
    }

    /// Initialise and connect every output.
    pub async fn start(&mut self) -> Result<(), PluginError> {
        for output in &mut self.outputs {
            output.init()?;
            output.connect().await?;
            tracing::info!(output = output.name(), "output ready");
        }
        Ok(())
    }

    pub async fn gather_once(&mut self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for input in &mut self.inputs {
            let name = input.name();
            let started = Instant::now();
            let result = match timeout(self.gather_timeout, input.gather()).await {
                Ok(result) => result,
                Err(_) => Err(CollectorError::Timeout {
                    input: name.to_string(),
                    timeout_ms: self.gather_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(gathered) => {
                    tracing::debug!(
                        input = name,
                        metrics = gathered.len(),
                        latency_us = started.elapsed().as_micros() as u64,
                        "gathered"
                    );
                    metrics.extend(gathered);
                }
                Err(e) => tracing::warn!(input = name, error = %e, "gather failed"),
            }
        }

        for metric in &mut metrics {
            for (key, value) in &self.global_tags {
                metric.add_tag(key.clone(), value.clone());
            }
        }
        metrics
    }

    /// Write one batch to every output. Failed writes are logged and the
    /// batch is dropped for that output.
    pub async fn flush(&mut self, metrics: &[Metric]) {
        if metrics.is_empty() {
            return;
        }
        for output in &mut self.outputs {
            let started = Instant::now();
            match output.write(metrics).await {
                Ok(()) => tracing::debug!(
                    output = output.name(),
                    metrics = metrics.len(),
                    latency_us = started.elapsed().as_micros() as u64,
                    "wrote batch"
                ),
                Err(e) => tracing::error!(
                    output = output.name(),
                    metrics = metrics.len(),
                    error = %e,
                    "write failed, dropping batch"
                ),
            }
        }
    }

    pub async fn stop(&mut self) {
        for output in &mut self.outputs {
            if let Err(e) = output.close().await {
                tracing::warn!(output = output.name(), error = %e, "closing output failed");
            }
        }
    }

    /// Gather and flush every interval until `shutdown` resolves, then close outputs.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "starting collection loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let metrics = self.gather_once().await;
                    self.flush(&metrics).await;
                }
            }
        }

        self.stop().await;
    }
}
