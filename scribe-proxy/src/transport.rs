#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::{
    io::{self, BufReader, Read, Write},
    path::Path,
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use interprocess::local_socket::LocalSocketStream;
use scribe_rpc::{
    RpcError,
    frame::{read_frame, write_frame},
};
use tracing::{debug, trace};

/// How long a call waits for its reply. Fixed, not adaptive.
pub const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Cuts the connection in both directions from outside the io thread.
pub type ShutdownHandle = Box<dyn FnOnce() + Send>;

/// A byte stream the transport can own on its io thread.
pub trait EditorStream: 'static + Read + Write + Send {
    /// A handle that unblocks a pending read on this stream and tells the
    /// peer the connection is over.
    fn shutdown_handle(&self) -> io::Result<ShutdownHandle>;
}

#[cfg(unix)]
impl EditorStream for UnixStream {
    fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        let handle = self.try_clone()?;
        Ok(Box::new(move || {
            let _ = handle.shutdown(std::net::Shutdown::Both);
        }))
    }
}

// Named pipes have no half-close. A blocked read ends when the editor
// writes or goes away.
#[cfg(not(unix))]
impl EditorStream for LocalSocketStream {
    fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        Ok(Box::new(|| {}))
    }
}

#[derive(Debug)]
enum IoEvent {
    Frame(Vec<u8>),
    WriteFailed(io::Error),
    ReadFailed(io::Error),
}

/// One exclusively owned connection to the editor.
///
/// The stream lives on a dedicated io thread that alternates strictly
/// between writing one payload and reading one frame, so there is never
/// more than one exchange on the wire. The caller waits on a channel, which
/// is what gives the read its deadline.
pub struct Transport {
    writer_tx: Option<Sender<Vec<u8>>>,
    shutdown: Option<ShutdownHandle>,
    reader_rx: Receiver<IoEvent>,
    deadline: Duration,
}

impl Transport {
    pub fn open(address: &Path) -> Result<Self, RpcError> {
        let stream = LocalSocketStream::connect(address)
            .map_err(RpcError::ConnectFailed)?;
        debug!("connected to editor at {}", address.display());
        Self::from_stream(into_editor_stream(stream))
    }

    pub fn from_stream<S: EditorStream>(stream: S) -> Result<Self, RpcError> {
        let shutdown = stream.shutdown_handle().map_err(RpcError::ConnectFailed)?;
        let (writer_tx, writer_rx) = crossbeam_channel::unbounded();
        let (reader_tx, reader_rx) = crossbeam_channel::unbounded();
        thread::Builder::new()
            .name("scribe-rpc-io".to_string())
            .spawn(move || io_loop(BufReader::new(stream), writer_rx, reader_tx))
            .map_err(RpcError::ConnectFailed)?;

        Ok(Self {
            writer_tx: Some(writer_tx),
            shutdown: Some(shutdown),
            reader_rx,
            deadline: READ_DEADLINE,
        })
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    #[cfg(test)]
    pub(crate) fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = deadline;
    }

    pub fn is_closed(&self) -> bool {
        self.writer_tx.is_none()
    }

    /// Send one payload and wait for the next frame off the wire.
    pub fn exchange(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let writer_tx = self.writer_tx.as_ref().ok_or(RpcError::Closed)?;
        writer_tx
            .send(payload)
            .map_err(|_| RpcError::WriteFailed(gone(io::ErrorKind::BrokenPipe)))?;
        self.next_frame(self.deadline)
    }

    /// Wait up to `timeout` for a further frame without sending anything.
    pub fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, RpcError> {
        if self.is_closed() {
            return Err(RpcError::Closed);
        }
        match self.reader_rx.recv_timeout(timeout) {
            Ok(IoEvent::Frame(frame)) => Ok(frame),
            Ok(IoEvent::WriteFailed(err)) => Err(RpcError::WriteFailed(err)),
            Ok(IoEvent::ReadFailed(err)) => Err(RpcError::ReadFailed(err)),
            Err(RecvTimeoutError::Timeout) => {
                Err(RpcError::ReadTimeout(self.deadline))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(RpcError::ReadFailed(gone(io::ErrorKind::UnexpectedEof)))
            }
        }
    }

    /// Release the connection. Safe to call more than once.
    ///
    /// The stream is shut down before the io thread is let go, so a read
    /// still waiting on a timed out reply returns at once and the thread
    /// drops the stream.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            trace!("closing editor connection");
            shutdown();
        }
        self.writer_tx.take();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn into_editor_stream(stream: LocalSocketStream) -> UnixStream {
    use std::os::unix::io::{FromRawFd, IntoRawFd};

    // SAFETY: on unix a local socket stream is a connected unix domain
    // socket, and `into_raw_fd` hands over sole ownership of it.
    unsafe { UnixStream::from_raw_fd(stream.into_raw_fd()) }
}

#[cfg(not(unix))]
fn into_editor_stream(stream: LocalSocketStream) -> LocalSocketStream {
    stream
}

fn gone(kind: io::ErrorKind) -> io::Error {
    io::Error::new(kind, "editor connection is gone")
}

fn io_loop<S>(
    mut stream: BufReader<S>,
    writer_rx: Receiver<Vec<u8>>,
    reader_tx: Sender<IoEvent>,
) where
    S: Read + Write,
{
    for payload in writer_rx {
        if let Err(err) = write_frame(stream.get_mut(), &payload) {
            let _ = reader_tx.send(IoEvent::WriteFailed(err));
            return;
        }
        match read_frame(&mut stream) {
            Ok(frame) => {
                if reader_tx.send(IoEvent::Frame(frame)).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = reader_tx.send(IoEvent::ReadFailed(err));
                return;
            }
        }
    }
    trace!("editor connection released");
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        os::unix::net::UnixStream,
        thread,
    };

    use super::*;

    fn echo_editor(server: UnixStream) {
        thread::spawn(move || {
            let mut writer = server.try_clone().unwrap();
            let mut reader = BufReader::new(server);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 {
                let _ = writer.write_all(line.as_bytes());
                line.clear();
            }
        });
    }

    #[test]
    fn test_exchange() {
        let (client, server) = UnixStream::pair().unwrap();
        echo_editor(server);
        let mut transport = Transport::from_stream(client).unwrap();
        assert_eq!(transport.deadline(), READ_DEADLINE);
        let frame = transport.exchange(b"[1,\"ping\",[]]\n".to_vec()).unwrap();
        assert_eq!(frame, b"[1,\"ping\",[]]\n");
        let frame = transport.exchange(b"[2,\"ping\",[]]\n".to_vec()).unwrap();
        assert_eq!(frame, b"[2,\"ping\",[]]\n");
    }

    #[test]
    fn test_read_timeout() {
        let (client, _server) = UnixStream::pair().unwrap();
        let mut transport = Transport::from_stream(client).unwrap();
        transport.set_deadline(Duration::from_millis(50));
        let err = transport.exchange(b"[1,\"ping\",[]]\n".to_vec()).unwrap_err();
        assert!(matches!(err, RpcError::ReadTimeout(_)));
    }

    #[test]
    fn test_peer_hangs_up() {
        let (client, server) = UnixStream::pair().unwrap();
        drop(server);
        let mut transport = Transport::from_stream(client).unwrap();
        let err = transport.exchange(b"[1,\"ping\",[]]\n".to_vec()).unwrap_err();
        assert!(matches!(
            err,
            RpcError::WriteFailed(_) | RpcError::ReadFailed(_)
        ));
    }

    #[test]
    fn test_closed() {
        let (client, server) = UnixStream::pair().unwrap();
        echo_editor(server);
        let mut transport = Transport::from_stream(client).unwrap();
        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert!(matches!(
            transport.exchange(b"[1,\"ping\",[]]\n".to_vec()),
            Err(RpcError::Closed)
        ));
        assert!(matches!(
            transport.next_frame(Duration::from_millis(10)),
            Err(RpcError::Closed)
        ));
    }

    #[test]
    fn test_close_releases_blocked_read() {
        let (client, server) = UnixStream::pair().unwrap();
        let mut transport = Transport::from_stream(client).unwrap();
        transport.set_deadline(Duration::from_millis(50));
        let err = transport.exchange(b"[1,\"ping\",[]]\n".to_vec()).unwrap_err();
        assert!(matches!(err, RpcError::ReadTimeout(_)));

        transport.close();
        drop(transport);

        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "[1,\"ping\",[]]\n");
        line.clear();
        assert_eq!(reader.read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = Transport::open(&dir.path().join("missing.sock"));
        assert!(matches!(result, Err(RpcError::ConnectFailed(_))));
    }
}
