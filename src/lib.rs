pub mod agent;
pub mod config;
pub mod errors;
pub mod inputs;
pub mod logging;
pub mod metric;
pub mod outputs;
