//! Resume command - Continue an interrupted run from recorded history.

use anyhow::{Context, Result};
use clap::Args;
use dbt_flow::{bootstrap, FlowConfig};
use flow_core::WorkflowClient;
use uuid::Uuid;

use super::ScriptCommandArgs;

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Run id printed by `dbt-flow run`
    run_id: Uuid,

    #[command(flatten)]
    script: ScriptCommandArgs,
}

pub async fn execute(args: ResumeArgs, mut config: FlowConfig, json: bool) -> Result<()> {
    if config.temporal.history_dir.is_none() {
        anyhow::bail!("Resuming needs a history directory (set temporal.history_dir or DBT_FLOW_HISTORY_DIR)");
    }
    args.script.apply(&mut config);

    let service = bootstrap::connect(&config).context("Failed to connect to execution service")?;
    let run = WorkflowClient::new(service.clone())
        .describe(args.run_id)
        .await
        .with_context(|| format!("Run {} not found", args.run_id))?;
    let workers = super::start_workers(&service, &config).await?;

    println!(
        "🔁 Resuming run {} (attempt {}, {:?}, {} recorded event(s))",
        args.run_id,
        run.attempt,
        run.status,
        run.history.len()
    );
    let outcome = bootstrap::resume_dbt_flow(&service, args.run_id).await;
    super::shutdown_all(workers).await?;

    super::run::report(&outcome?, json)
}
