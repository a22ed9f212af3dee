use regex::Regex;
use serde_json::Value;

use super::TaskInputs;
use crate::error::ResolutionError;

/// Name-matching pattern with named capture groups.
///
/// The pattern always matches the whole task name; `build/(?P<prefix>.+)`
/// binds `prefix` for `build/x86_64` but does not match `rebuild/x86_64`.
#[derive(Debug, Clone)]
pub struct TaskPattern {
    source: String,
    regex: Regex,
}

impl TaskPattern {
    pub fn new(pattern: &str) -> Result<Self, ResolutionError> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|e| ResolutionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `name` and bind every named group that participated in the match.
    pub fn captures(&self, name: &str) -> Option<TaskInputs> {
        let caps = self.regex.captures(name)?;
        let mut inputs = TaskInputs::new();
        for group in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(group) {
                inputs.insert(group.to_string(), Value::String(m.as_str().to_string()));
            }
        }
        Some(inputs)
    }
}
