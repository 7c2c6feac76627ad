//! Run command - Start the workers and run the pipeline to completion.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dbt_flow::{bootstrap, DeploymentResult, FlowConfig};

use super::ScriptCommandArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Also write the deployment result as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    pub script: ScriptCommandArgs,
}

pub async fn execute(args: RunArgs, mut config: FlowConfig, json: bool) -> Result<()> {
    args.script.apply(&mut config);
    let service = bootstrap::connect(&config).context("Failed to connect to execution service")?;
    let workers = super::start_workers(&service, &config).await?;

    println!("📦 Packaging {}", config.source_dir.display());
    let handle = bootstrap::start_dbt_flow(&service).await?;
    let run_id = handle.run_id();
    if config.temporal.history_dir.is_some() {
        println!("   Run {} (resume with `dbt-flow resume {}`)", run_id, run_id);
    }

    let outcome = handle.result::<DeploymentResult>().await;
    super::shutdown_all(workers).await?;
    let result = outcome.map_err(dbt_flow::PipelineError::from)?;

    report(&result, json)?;
    if let Some(path) = args.output {
        let body = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Print a finished deployment.
pub(crate) fn report(result: &DeploymentResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!();
    println!("✅ Deployment complete");
    println!("   Script:   {}", result.script_id);
    println!("   Image:    {}", result.image);
    println!("   Instance: {}", result.instance_name);
    if !result.script_output.is_empty() {
        println!("   Output:   {}", result.script_output);
    }
    Ok(())
}
