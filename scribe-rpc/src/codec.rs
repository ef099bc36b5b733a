use serde_json::Value;

use crate::error::RpcError;

pub type RequestId = u64;

/// A call as it travels to the editor: `[id, method, [args...]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: RequestId,
    pub method: String,
    pub args: Vec<Value>,
}

/// A decoded reply: `[tag, result]` or `[tag, result, error]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Echo of the request id, or a constant kind marker for peers that do
    /// not echo ids.
    pub tag: Value,
    pub result: Value,
    /// Only set when the third element is present and non-null.
    pub error: Option<Value>,
}

impl Reply {
    pub fn request_id(&self) -> Option<RequestId> {
        self.tag.as_u64()
    }

    /// A remote error wins over whatever came back as the result.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(detail) => Err(RpcError::RemoteError(detail)),
            None => Ok(self.result),
        }
    }
}

/// Serialize a call into one newline terminated frame.
///
/// Compact JSON escapes newlines inside strings, so the trailing `\n` is the
/// only one in the frame.
pub fn encode(
    id: RequestId,
    method: &str,
    args: &[Value],
) -> Result<Vec<u8>, RpcError> {
    let mut frame = serde_json::to_vec(&(id, method, args))
        .map_err(|err| RpcError::WriteFailed(err.into()))?;
    frame.push(b'\n');
    Ok(frame)
}

pub fn decode(frame: &[u8]) -> Result<Reply, RpcError> {
    let value: Value = serde_json::from_slice(frame)
        .map_err(|err| RpcError::MalformedReply(err.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(RpcError::MalformedReply(format!(
                "expected an array, got {other}"
            )));
        }
    };
    if items.len() < 2 {
        return Err(RpcError::MalformedReply(format!(
            "expected at least 2 elements, got {}",
            items.len()
        )));
    }

    let mut items = items.into_iter();
    let tag = items.next().unwrap_or_default();
    let result = items.next().unwrap_or_default();
    let error = items.next().filter(|error| !error.is_null());
    Ok(Reply { tag, result, error })
}

/// The inverse of [`encode`]. The editor side of the conversation uses this.
pub fn decode_call(frame: &[u8]) -> Result<Call, RpcError> {
    let (id, method, args): (RequestId, String, Vec<Value>) =
        serde_json::from_slice(frame)
            .map_err(|err| RpcError::MalformedReply(err.to_string()))?;
    Ok(Call { id, method, args })
}
