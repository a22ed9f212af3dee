use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

use super::{TaskDefinition, TaskInputs};
use crate::error::ResolutionError;

/// A definition matched to a concrete task name.
#[derive(Clone)]
pub struct Resolved {
    pub definition: Arc<dyn TaskDefinition>,
    pub inputs: TaskInputs,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("kind", &self.definition.kind())
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Ordered lookup table of task definitions. Built once, then shared read-only.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    definitions: Vec<Arc<dyn TaskDefinition>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D>(&mut self, definition: D)
    where
        D: TaskDefinition + 'static,
    {
        self.definitions.push(Arc::new(definition));
    }

    /// Resolve `name` to the first definition whose pattern matches it.
    pub fn resolve(&self, name: &str) -> Result<Resolved, ResolutionError> {
        validate_task_name(name)?;
        self.try_resolve(name)
            .ok_or_else(|| ResolutionError::NotFound(name.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but treats "no match" as a non-error outcome.
    pub fn try_resolve(&self, name: &str) -> Option<Resolved> {
        self.definitions.iter().find_map(|definition| {
            definition.pattern().captures(name).map(|inputs| Resolved {
                definition: definition.clone(),
                inputs,
            })
        })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<dyn TaskDefinition>> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Task names double as relative paths under `tasks/`.
pub fn validate_task_name(name: &str) -> Result<(), ResolutionError> {
    let invalid = || ResolutionError::InvalidName(name.to_string());
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(invalid());
    }
    for component in Path::new(name).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(invalid());
        }
    }
    Ok(())
}
