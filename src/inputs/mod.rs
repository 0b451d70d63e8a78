pub mod cpu;
pub mod mem;

use crate::errors::CollectorError;
use crate::metric::Metric;
use async_trait::async_trait;

#[async_trait]
pub trait Input: Send {
    /// name of the input as used in logs
    fn name(&self) -> &'static str;

    /// poll the source once and return whatever metrics it produced.
    async fn gather(&mut self) -> Result<Vec<Metric>, CollectorError>;
}

/// Read a procfs file, mapping failures to [`CollectorError::ProcReadError`].
pub(crate) async fn read_proc(path: &str) -> Result<String, CollectorError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CollectorError::ProcReadError {
            path: path.into(),
            source: e,
        })
}
