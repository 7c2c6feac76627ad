//! dbt-flow CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid configuration
//! - 3: Activity failure
//! - 4: Activity timeout

use std::process::ExitCode;

use clap::Parser;
use dbt_flow::PipelineError;
use flow_core::{ActivityError, FlowError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const ACTIVITY_FAILED: u8 = 3;
    pub const TIMEOUT: u8 = 4;
}

const DEFAULT_DIRECTIVES: &str = "dbt_flow=info,flow_core=info,flow_cloud=info,warn";
const VERBOSE_DIRECTIVES: &str = "dbt_flow=debug,flow_core=debug,flow_cloud=debug,info";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let config = match cli.settings.resolve(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Resume(args) => commands::resume::execute(args, config, cli.json).await,
        Commands::Stop(args) => commands::stop::execute(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => fail(&e),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_DIRECTIVES
        } else {
            DEFAULT_DIRECTIVES
        })
    });

    // Logs go to stderr so --json results on stdout stay parseable.
    let log_result = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

fn fail(e: &anyhow::Error) -> ExitCode {
    let exit_code = categorize_error(e);
    eprintln!("❌ Error: {:#}", e);
    ExitCode::from(exit_code)
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<PipelineError>() {
            return match err {
                PipelineError::InvalidConfig(_) | PipelineError::ConfigParse { .. } => {
                    ExitCodes::INVALID_CONFIG
                }
                PipelineError::Flow(flow) => categorize_flow_error(flow),
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
        if let Some(flow) = cause.downcast_ref::<FlowError>() {
            return categorize_flow_error(flow);
        }
        if let Some(activity) = cause.downcast_ref::<ActivityError>() {
            return categorize_activity_error(activity);
        }
    }
    ExitCodes::GENERAL_ERROR
}

fn categorize_activity_error(e: &ActivityError) -> u8 {
    if e.is_timeout() {
        ExitCodes::TIMEOUT
    } else {
        ExitCodes::ACTIVITY_FAILED
    }
}

fn categorize_flow_error(e: &FlowError) -> u8 {
    if let Some(activity) = e.activity_error() {
        return categorize_activity_error(activity);
    }
    match e {
        FlowError::NamespaceNotFound(_) | FlowError::Connection(_) => ExitCodes::INVALID_CONFIG,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
