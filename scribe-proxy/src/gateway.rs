use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    time::Instant,
};

use scribe_rpc::{
    RequestId, RpcError, Value,
    buffer::{BufferId, join_lines, split_lines},
    codec::{self, Reply},
};
use tracing::{debug, info, warn};

use crate::transport::{EditorStream, Transport};

/// Editor methods the gateway drives.
pub mod method {
    pub const GET_CURRENT_BUF: &str = "nvim_get_current_buf";
    pub const BUF_GET_LINES: &str = "nvim_buf_get_lines";
    pub const BUF_SET_LINES: &str = "nvim_buf_set_lines";
    pub const BUF_GET_OPTION: &str = "nvim_buf_get_option";
}

struct PendingCall {
    method: String,
    /// Timed out. A reply may still turn up and must not be taken for
    /// someone else's.
    abandoned: bool,
}

/// Synchronous RPC client for a running editor.
///
/// Owns its connection from construction until [`Gateway::close`] or drop.
/// Every call gets a fresh id; replies are matched against it, and late
/// replies to timed out calls are skipped. Nothing is retried and nothing
/// reconnects behind the caller's back: after a timeout or a malformed reply
/// [`Gateway::is_desynchronized`] turns true and it is up to the caller to
/// [`Gateway::reconnect`].
pub struct Gateway {
    address: Option<PathBuf>,
    transport: Option<Transport>,
    next_id: RequestId,
    pending: HashMap<RequestId, PendingCall>,
    desynchronized: bool,
}

impl Gateway {
    pub fn connect(address: &Path) -> Result<Self, RpcError> {
        let transport = Transport::open(address)?;
        info!("editor gateway ready on {}", address.display());
        Ok(Self::with_transport(Some(address.to_path_buf()), transport))
    }

    /// A gateway over a connection the caller already holds. Such a gateway
    /// has nothing to reconnect to.
    pub fn from_stream<S: EditorStream>(stream: S) -> Result<Self, RpcError> {
        Ok(Self::with_transport(None, Transport::from_stream(stream)?))
    }

    fn with_transport(address: Option<PathBuf>, transport: Transport) -> Self {
        Self {
            address,
            transport: Some(transport),
            next_id: 1,
            pending: HashMap::new(),
            desynchronized: false,
        }
    }

    pub fn address(&self) -> Option<&Path> {
        self.address.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    fn next_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Invoke `method` on the editor and wait for its result.
    pub fn call(
        &mut self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id();
        let payload = codec::encode(id, method, &args)?;
        let transport = self.transport.as_mut().ok_or(RpcError::Closed)?;

        debug!(id, method, "rpc call");
        self.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                abandoned: false,
            },
        );

        let reply = await_reply(transport, &mut self.pending, id, payload);
        match &reply {
            Err(RpcError::ReadTimeout(_)) => {
                if let Some(call) = self.pending.get_mut(&id) {
                    call.abandoned = true;
                }
                self.desynchronized = true;
                warn!(id, method, "no reply before deadline");
            }
            Err(err) => {
                self.pending.remove(&id);
                if err.desynchronizes() {
                    self.desynchronized = true;
                    warn!(id, method, "{err}");
                }
            }
            Ok(_) => {
                self.pending.remove(&id);
            }
        }
        reply?.into_result()
    }

    /// Drop the current connection, forget pending calls and dial the same
    /// address again.
    pub fn reconnect(&mut self) -> Result<(), RpcError> {
        self.close();
        let address = self.address.clone().ok_or_else(|| {
            RpcError::ConnectFailed(io::Error::new(
                io::ErrorKind::NotFound,
                "no editor address to reconnect to",
            ))
        })?;
        self.transport = Some(Transport::open(&address)?);
        self.desynchronized = false;
        info!("reconnected to editor at {}", address.display());
        Ok(())
    }

    /// Release the connection. Calls made afterwards fail with
    /// [`RpcError::Closed`].
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            debug!("editor gateway closed");
        }
        self.pending.clear();
    }

    pub fn get_current_buffer(&mut self) -> Result<BufferId, RpcError> {
        let value = self.call(method::GET_CURRENT_BUF, Vec::new())?;
        BufferId::from_value(&value).ok_or(RpcError::InvalidBufferId(value))
    }

    /// Whole text of the current buffer, every line newline terminated.
    pub fn get_current_buffer_content(&mut self) -> Result<String, RpcError> {
        let buffer = self.get_current_buffer()?;
        let lines = self.call(
            method::BUF_GET_LINES,
            vec![buffer.into(), 0.into(), (-1).into(), true.into()],
        )?;
        match lines {
            Value::Array(lines) => Ok(join_lines(&lines)),
            other => Err(RpcError::InvalidContentFormat(other)),
        }
    }

    /// Overwrite the whole current buffer with `text`.
    pub fn replace_buffer_content(&mut self, text: &str) -> Result<(), RpcError> {
        let buffer = self.get_current_buffer()?;
        let lines = split_lines(text);
        self.call(
            method::BUF_SET_LINES,
            vec![
                buffer.into(),
                0.into(),
                (-1).into(),
                true.into(),
                lines.into(),
            ],
        )?;
        Ok(())
    }

    pub fn get_filetype(&mut self) -> Result<String, RpcError> {
        let filetype = self.call(
            method::BUF_GET_OPTION,
            vec![BufferId::CURRENT.into(), "filetype".into()],
        )?;
        match filetype {
            Value::String(filetype) => Ok(filetype),
            other => Err(RpcError::InvalidFiletype(other)),
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exchange `payload` and return the reply that belongs to call `id`,
/// skipping late replies to abandoned calls within the same deadline.
fn await_reply(
    transport: &mut Transport,
    pending: &mut HashMap<RequestId, PendingCall>,
    id: RequestId,
    payload: Vec<u8>,
) -> Result<Reply, RpcError> {
    let deadline = Instant::now() + transport.deadline();
    let mut frame = transport.exchange(payload)?;
    loop {
        let reply = codec::decode(&frame)?;
        match reply.request_id() {
            Some(tag)
                if tag != id
                    && pending.get(&tag).is_some_and(|call| call.abandoned) =>
            {
                if let Some(call) = pending.remove(&tag) {
                    warn!(id = tag, method = %call.method, "discarding late reply");
                }
            }
            // Peers that do not echo ids answer the only call in flight.
            _ => return Ok(reply),
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        frame = transport.next_frame(remaining)?;
    }
}
