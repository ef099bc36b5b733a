pub mod buffer;
pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{Call, Reply, RequestId};
pub use error::RpcError;
pub use serde_json::Value;
