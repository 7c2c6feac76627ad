//! Lookup tables a worker dispatches tasks through.
//!
//! Activity tasks carry an activity type and workflow tasks a workflow type;
//! a worker answers a task only if the type is in its tables. A type
//! registered twice keeps the later implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::activity::Activity;
use crate::error::{FlowError, FlowResult};
use crate::workflow::Workflow;

/// Activity implementations keyed by activity type.
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    by_type: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        let activity_type = activity.name().to_string();
        self.insert(activity_type, activity);
    }

    /// Copy every entry of `other` into this table.
    pub fn merge(&mut self, other: &ActivityRegistry) {
        for (activity_type, activity) in &other.by_type {
            self.insert(activity_type.clone(), Arc::clone(activity));
        }
    }

    fn insert(&mut self, activity_type: String, activity: Arc<dyn Activity>) {
        if self.by_type.insert(activity_type.clone(), activity).is_some() {
            warn!("Activity type {} registered twice; keeping the later one", activity_type);
        } else {
            debug!("Activity type {} registered", activity_type);
        }
    }

    pub fn get(&self, activity_type: &str) -> Option<Arc<dyn Activity>> {
        self.by_type.get(activity_type).cloned()
    }

    pub fn contains(&self, activity_type: &str) -> bool {
        self.by_type.contains_key(activity_type)
    }

    /// Registered activity types, sorted.
    pub fn activity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.activity_types()).finish()
    }
}

/// Workflow implementations keyed by workflow type.
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    by_type: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow: Arc<dyn Workflow>) {
        let workflow_type = workflow.workflow_type().to_string();
        if self.by_type.insert(workflow_type.clone(), workflow).is_some() {
            warn!("Workflow type {} registered twice; keeping the later one", workflow_type);
        }
    }

    /// The implementation for a run's workflow type.
    ///
    /// A run routed to a worker that lacks its type fails with
    /// `WorkflowNotRegistered`, which is never retried.
    pub fn get_required(&self, workflow_type: &str) -> FlowResult<Arc<dyn Workflow>> {
        self.by_type
            .get(workflow_type)
            .cloned()
            .ok_or_else(|| FlowError::WorkflowNotRegistered(workflow_type.to_string()))
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.by_type.contains_key(workflow_type)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.by_type.keys()).finish()
    }
}
