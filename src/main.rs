use clap::Parser;
use sql_metrics_agent::agent::Agent;
use sql_metrics_agent::config::{AgentConfig, Cli};
use sql_metrics_agent::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json_logs, &cli.log_level)?;

    let config = AgentConfig::load(&cli.config)?;
    let mut agent = Agent::from_config(&config);
    agent.start().await?;

    if cli.once {
        let metrics = agent.gather_once().await;
        agent.flush(&metrics).await;
        agent.stop().await;
        return Ok(());
    }

    agent
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "listening for ctrl-c failed");
            }
        })
        .await;
    Ok(())
}
