pub mod sql;

use crate::errors::PluginError;
use crate::metric::Metric;
use async_trait::async_trait;

/// Push-based sink for gathered metrics.
///
/// The agent calls `init` once, then `connect`, then `write` for every batch
/// (never concurrently on the same instance) and finally `close`.
#[async_trait]
pub trait Output: Send {
    /// name of the output as used in logs
    fn name(&self) -> &'static str;

    /// validate configuration before any connection is attempted.
    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), PluginError>;

    async fn write(&mut self, metrics: &[Metric]) -> Result<(), PluginError>;

    async fn close(&mut self) -> Result<(), PluginError>;
}
