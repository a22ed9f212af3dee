use std::collections::BTreeMap;

use async_trait::async_trait;
use ostbuild_core::error::{ResolutionError, TaskExecutionError};
use ostbuild_core::task::{Isolation, TaskContext, TaskDefinition, TaskInputs, TaskPattern};
use serde_json::{Map, Value};

use super::captured_name;

/// `group/<name>`: depends on the configured members and collects their results.
pub struct GroupTask {
    pattern: TaskPattern,
    groups: BTreeMap<String, Vec<String>>,
}

impl GroupTask {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Result<Self, ResolutionError> {
        Ok(Self {
            pattern: TaskPattern::new(r"group/(?P<name>[A-Za-z0-9_.+-]+)")?,
            groups,
        })
    }

    fn members(&self, inputs: &TaskInputs) -> Result<&[String], ResolutionError> {
        let name = captured_name(inputs);
        self.groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ResolutionError::NotFound(format!("group/{name}")))
    }
}

#[async_trait]
impl TaskDefinition for GroupTask {
    fn kind(&self) -> &str {
        "group"
    }

    fn pattern(&self) -> &TaskPattern {
        &self.pattern
    }

    fn dependencies(&self, inputs: &TaskInputs) -> Result<Vec<String>, ResolutionError> {
        Ok(self.members(inputs)?.to_vec())
    }

    fn isolation(&self, _inputs: &TaskInputs) -> Isolation {
        Isolation::InProcess
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let members = self
            .members(&ctx.inputs)
            .map_err(|e| TaskExecutionError::Failed(e.to_string()))?;
        let results: Map<String, Value> = members
            .iter()
            .map(|member| {
                let result = ctx.dependency_results.get(member).cloned();
                (member.clone(), result.unwrap_or(Value::Null))
            })
            .collect();
        Ok(Value::Object(results))
    }
}
