use std::sync::Arc;

use serde_json::Value;

use crate::error::TaskExecutionError;
use crate::task::{TaskContext, TaskDefinition};

/// Runs a task body directly on the scheduler's runtime.
pub struct InProcessUnit {
    definition: Arc<dyn TaskDefinition>,
    ctx: TaskContext,
}

impl InProcessUnit {
    pub fn new(definition: Arc<dyn TaskDefinition>, ctx: TaskContext) -> Self {
        Self { definition, ctx }
    }

    pub async fn run(self) -> Result<Value, TaskExecutionError> {
        tracing::debug!(task = %self.ctx.name, kind = self.definition.kind(), "running in-process");
        self.definition.execute(&self.ctx).await
    }
}
