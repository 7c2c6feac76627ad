//! Activity definitions.
//!
//! Activities are the only place where a workflow touches the outside world:
//! remote jobs, storage, processes. The engine invokes them at least once per
//! scheduled call and retries failed attempts according to the caller's
//! `ActivityOptions`.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use flow_core::{Activity, ActivityContext, ActivityResult};
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Activity for Greet {
//!     fn name(&self) -> &str { "greet" }
//!
//!     async fn execute(&self, ctx: ActivityContext, input: serde_json::Value) -> ActivityResult<serde_json::Value> {
//!         Ok(serde_json::json!(format!("hello {} (attempt {})", input, ctx.attempt())))
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ActivityError, ActivityResult};

/// Information about the attempt being executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub activity_type: String,
    pub task_queue: String,
    pub workflow_id: String,
    pub run_id: Uuid,
    /// Position of the call in the run's command sequence
    pub seq: u64,
    /// 1-based attempt number
    pub attempt: u32,
}

/// Context handed to each activity attempt.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    info: ActivityInfo,
}

impl ActivityContext {
    pub fn new(info: ActivityInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    pub fn attempt(&self) -> u32 {
        self.info.attempt
    }
}

/// Trait for activity implementations.
///
/// Activities must be `Send + Sync`; a worker runs attempts of the same
/// activity concurrently.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Activity type name used to route invocations to this implementation.
    fn name(&self) -> &str;

    /// Execute one attempt.
    async fn execute(
        &self,
        ctx: ActivityContext,
        input: serde_json::Value,
    ) -> ActivityResult<serde_json::Value>;
}

type Handler = Arc<
    dyn Fn(ActivityContext, serde_json::Value) -> BoxFuture<'static, ActivityResult<serde_json::Value>>
        + Send
        + Sync,
>;

/// Activity backed by a closure.
#[derive(Clone)]
pub struct FnActivity {
    name: String,
    handler: Handler,
}

impl FnActivity {
    /// Wrap a closure working on raw JSON values.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActivityContext, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActivityResult<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |ctx, input| Box::pin(f(ctx, input))),
        }
    }

    /// Wrap a closure with typed input and output.
    ///
    /// Input that fails to decode is a non-retryable failure.
    pub fn typed<I, O, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActivityResult<O>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(name, move |ctx, input| {
            let f = Arc::clone(&f);
            async move {
                let input: I = serde_json::from_value(input)
                    .map_err(|e| ActivityError::non_retryable(format!("invalid input: {}", e)))?;
                let output = f(ctx, input).await?;
                serde_json::to_value(output)
                    .map_err(|e| ActivityError::non_retryable(format!("invalid output: {}", e)))
            }
        })
    }
}

#[async_trait]
impl Activity for FnActivity {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: ActivityContext,
        input: serde_json::Value,
    ) -> ActivityResult<serde_json::Value> {
        (self.handler)(ctx, input).await
    }
}

impl std::fmt::Debug for FnActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnActivity").field("name", &self.name).finish()
    }
}
