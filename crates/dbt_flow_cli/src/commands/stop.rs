//! Stop command - Stop a deployed compute instance.

use anyhow::{Context, Result};
use clap::Args;
use dbt_flow::{bootstrap, instance_name, DockerActivities, FlowConfig};

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Instance name, or the script id of a run with --script-id
    instance: String,

    /// Treat the argument as a script id and derive the instance name
    #[arg(long)]
    script_id: bool,
}

pub async fn execute(args: StopArgs, config: FlowConfig) -> Result<()> {
    let instance = if args.script_id {
        instance_name(&args.instance)
    } else {
        args.instance
    };

    let activities = bootstrap::docker_activities(&config)
        .await
        .context("Failed to set up docker activities")?;

    println!("🛑 Stopping {}", instance);
    activities
        .stop_compute_instance(instance.clone())
        .await
        .with_context(|| format!("Failed to stop {}", instance))?;
    println!("✅ Stopped {}", instance);
    Ok(())
}
