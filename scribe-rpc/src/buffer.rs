use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The editor's handle for an in-memory text buffer.
#[derive(Eq, PartialEq, Hash, Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(pub i64);

impl BufferId {
    /// `0` addresses whichever buffer is current in the editor.
    pub const CURRENT: BufferId = BufferId(0);

    /// Integers, and floats without a fractional part as some JSON bridges
    /// emit them.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(id) = value.as_i64() {
            return Some(BufferId(id));
        }
        value
            .as_f64()
            .filter(|id| id.fract() == 0.0 && id.abs() < i64::MAX as f64)
            .map(|id| BufferId(id as i64))
    }
}

impl From<BufferId> for Value {
    fn from(id: BufferId) -> Value {
        Value::from(id.0)
    }
}

/// Join wire lines into buffer text. Every line, the last included, is
/// followed by `\n`. Entries that are not strings are skipped.
pub fn join_lines(lines: &[Value]) -> String {
    let mut text = String::new();
    for line in lines.iter().filter_map(Value::as_str) {
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Split buffer text into wire lines. A final newline does not produce a
/// trailing empty line; empty lines anywhere else are kept.
pub fn split_lines(text: &str) -> Vec<String> {
    let body = match text.strip_suffix('\n') {
        Some(body) => body,
        None if text.is_empty() => return Vec::new(),
        None => text,
    };
    body.split('\n').map(str::to_string).collect()
}
