//! # dbt_flow
//!
//! Durable build → push → deploy pipeline for dbt projects.
//!
//! A run packages the project directory, builds a container image from it,
//! pushes the image, starts a compute instance running it and finally hands
//! over to a script worker on a separate task queue. Every step is an
//! activity with its own timeout and retry policy; the run as a whole is
//! retried up to three times.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbt_flow::{bootstrap, FlowConfig, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlowConfig::load(None)?;
//!     let service = bootstrap::connect(&config)?;
//!
//!     let activities = bootstrap::docker_activities(&config).await?;
//!     let _worker = bootstrap::initiate_worker(&service, activities, PipelineOptions::default());
//!     let _scripts = bootstrap::initiate_script_worker(&service, bootstrap::script_activities(&config));
//!
//!     let result = bootstrap::run_dbt_flow(&service).await?;
//!     println!("Deployed {} on {}", result.image, result.instance_name);
//!     Ok(())
//! }
//! ```

pub mod activities;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod workflow;

pub use activities::{
    activity_registry, instance_name, CloudBuildActivities, DockerActivities,
    LocalDockerActivities, ScriptActivities, ScriptRequest,
};
pub use bootstrap::{TASK_QUEUE, WORKFLOW_ATTEMPTS};
pub use config::{Backend, FlowConfig};
pub use error::{PipelineError, PipelineResult};
pub use workflow::{
    DeploymentResult, DockerBuildAndDeployWorkflow, PipelineOptions, SCRIPT_TASK_QUEUE,
    WORKFLOW_TYPE,
};
