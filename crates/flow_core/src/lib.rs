//! # flow_core
//!
//! Durable workflow and activity layer for dbt-flow.
//!
//! This crate is the contract the pipeline is written against: workflows are
//! deterministic coordinators, activities perform the side effects, and the
//! execution service routes both through named task queues while recording
//! every step so a run can be replayed after a crash.
//!
//! # Architecture
//!
//! - **Service**: Connection (target + namespace) owning task queues and run history
//! - **Worker**: Polls one task queue and executes registered workflows and activities
//! - **Client**: Submits runs with a workflow-level retry policy and awaits results
//! - **Context**: Deterministic primitives available to workflow code
//! - **History**: Append-only event log per run, persisted after every event
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flow_core::{ExecutionService, ServiceConfig, Worker, WorkflowClient, WorkflowOptions};
//!
//! let service = ExecutionService::connect(ServiceConfig::default())?;
//!
//! let mut worker = Worker::new(service.clone(), "DBT-FLOW");
//! worker.register_workflow(Arc::new(MyWorkflow));
//! worker.register_activity(Arc::new(MyActivity));
//! let _worker = worker.start();
//!
//! let client = WorkflowClient::new(service);
//! let result: String = client.execute("MyWorkflow", WorkflowOptions::new("DBT-FLOW")).await?;
//! ```

pub mod activity;
pub mod client;
pub mod context;
pub mod error;
pub mod history;
pub mod options;
pub mod registry;
pub mod service;
pub mod worker;
pub mod workflow;

// Re-export main types for convenience
pub use activity::{Activity, ActivityContext, ActivityInfo, FnActivity};
pub use client::{WorkflowClient, WorkflowHandle};
pub use context::WorkflowContext;
pub use error::{ActivityError, ActivityErrorKind, ActivityResult, FlowError, FlowResult};
pub use history::{
    FileHistoryStore, HistoryEvent, HistoryStore, MemoryHistoryStore, RecordedActivity,
    RecordedCommand, WorkflowRun,
};
pub use options::{ActivityOptions, RetryPolicy, WorkflowOptions};
pub use registry::{ActivityRegistry, WorkflowRegistry};
pub use service::{
    ExecutionService, ServiceConfig, DEFAULT_NAMESPACE, INPROC_SCHEME, LOCAL_TARGET,
};
pub use worker::{Worker, WorkerHandle};
pub use workflow::{RunStatus, Workflow};
