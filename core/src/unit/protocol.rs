//! Result wire format: the child writes one JSON object to the result pipe;
//! its optional `result` key carries the task's output.

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TaskExecutionError;

pub const RESULT_KEY: &str = "result";

/// Read the result stream to EOF and extract the task's output value.
pub async fn read_result<R>(mut reader: R) -> Result<Value, TaskExecutionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| TaskExecutionError::ResultStream(e.to_string()))?;
    parse_result(&buf)
}

pub fn parse_result(bytes: &[u8]) -> Result<Value, TaskExecutionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(TaskExecutionError::ResultStream("empty result stream".into()));
    }
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| TaskExecutionError::ResultStream(e.to_string()))?;
    match doc {
        // A missing `result` key is an empty result, not an error.
        Value::Object(mut map) => Ok(map.remove(RESULT_KEY).unwrap_or(Value::Null)),
        other => Err(TaskExecutionError::ResultShape(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

pub fn encode_result(value: Value) -> Vec<u8> {
    json!({ RESULT_KEY: value }).to_string().into_bytes()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
