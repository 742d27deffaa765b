use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use wiremsg_frame::{FrameConfig, FrameError, Message, MessageCodec, MessageKind};

use crate::error::PeerError;
use crate::handshake;
use crate::queue::TsQueue;

/// Server-assigned connection identity. Client-side connections use 0.
pub type ClientId = u32;

/// Which end of the link a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Lifecycle of a connection.
///
/// `Closed` is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Created = 0,
    /// Client only: TCP connect in progress.
    Connecting = 1,
    AwaitingValidation = 2,
    Ready = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Connecting,
            2 => Self::AwaitingValidation,
            3 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

/// A received message tagged with the connection it arrived on.
///
/// `remote` is `None` on the client side, which only has one peer.
#[derive(Clone)]
pub struct OwnedMessage<T> {
    pub remote: Option<ClientId>,
    pub msg: Message<T>,
}

impl<T: MessageKind> fmt::Display for OwnedMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl<T: MessageKind> fmt::Debug for OwnedMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedMessage")
            .field("remote", &self.remote)
            .field("msg", &self.msg)
            .finish()
    }
}

struct Shared {
    id: ClientId,
    role: Role,
    state: AtomicU8,
    // Messages handed to `send` but not yet fully written.
    unsent: AtomicUsize,
    close: CancellationToken,
    peer_addr: OnceLock<SocketAddr>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` unless already closed.
    fn advance(&self, next: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (raw != ConnectionState::Closed as u8).then_some(next as u8)
            })
            .is_ok()
    }

    fn close(&self) {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if previous != ConnectionState::Closed as u8 {
            debug!(id = self.id, role = ?self.role, "connection closed");
        }
        // Whatever was still queued is discarded with the pipeline.
        self.unsent.store(0, Ordering::Release);
        self.close.cancel();
    }

    fn release_unsent(&self) {
        let _ = self
            .unsent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Handle to one connection.
///
/// Cheap to clone. Sending from any thread hands the message to the
/// connection's reactor, which owns the socket and writes queued messages
/// strictly in order.
#[derive(Clone)]
pub struct Connection<T> {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message<T>>,
}

impl<T: MessageKind> Connection<T> {
    pub fn id(&self) -> ClientId {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// True while the socket is open (any state but `Closed`).
    pub fn is_connected(&self) -> bool {
        self.state() != ConnectionState::Closed
    }

    /// True once the handshake has completed and the link is still open.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_addr.get().copied()
    }

    /// Queue `msg` for sending.
    ///
    /// Messages sent before the handshake completes are held and written
    /// once the connection is ready. Sending on a closed connection drops
    /// the message.
    pub fn send(&self, msg: Message<T>) {
        if !self.is_connected() {
            debug!(id = self.id(), %msg, "send on closed connection dropped");
            return;
        }
        self.shared.unsent.fetch_add(1, Ordering::AcqRel);
        if self.outgoing.send(msg).is_err() {
            self.shared.release_unsent();
            debug!(id = self.id(), "connection pipeline gone; message dropped");
        }
    }

    /// Messages sent on this connection that have not been written yet.
    ///
    /// Always 0 once the connection is closed: queued messages are dropped.
    pub fn unsent(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        self.shared.unsent.load(Ordering::Acquire)
    }

    /// Close the socket. Idempotent.
    pub fn disconnect(&self) {
        self.shared.close();
    }
}

impl<T: MessageKind> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("state", &self.state())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

/// Marks the connection closed however its pipeline ends, including the
/// reactor dropping it on shutdown.
struct CloseGuard(Arc<Shared>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// The reactor-side half of a connection: handshake, then the read and
/// write pipelines.
pub(crate) struct Pipeline<T> {
    guard: CloseGuard,
    handle: Connection<T>,
    outgoing: mpsc::UnboundedReceiver<Message<T>>,
    incoming: Arc<TsQueue<OwnedMessage<T>>>,
    frame: FrameConfig,
}

/// Create a connection handle and the pipeline that drives it.
pub(crate) fn new_connection<T: MessageKind>(
    id: ClientId,
    role: Role,
    peer_addr: Option<SocketAddr>,
    incoming: Arc<TsQueue<OwnedMessage<T>>>,
    frame: FrameConfig,
) -> (Connection<T>, Pipeline<T>) {
    let shared = Arc::new(Shared {
        id,
        role,
        state: AtomicU8::new(ConnectionState::Created as u8),
        unsent: AtomicUsize::new(0),
        close: CancellationToken::new(),
        peer_addr: OnceLock::new(),
    });
    if let Some(addr) = peer_addr {
        let _ = shared.peer_addr.set(addr);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Connection {
        shared: Arc::clone(&shared),
        outgoing: tx,
    };
    let pipeline = Pipeline {
        guard: CloseGuard(shared),
        handle: handle.clone(),
        outgoing: rx,
        incoming,
        frame,
    };
    (handle, pipeline)
}

impl<T: MessageKind> Pipeline<T> {
    /// Server side: validate the client, notify, then pump messages.
    pub(crate) async fn serve<F>(self, mut stream: TcpStream, nonce: u64, on_validated: F)
    where
        F: FnOnce(&Connection<T>) + Send,
    {
        let shared = &self.guard.0;
        let token = shared.close.clone();
        if !shared.advance(ConnectionState::AwaitingValidation) {
            return;
        }

        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = handshake::server_handshake(&mut stream, nonce) => result,
        };
        match result {
            Ok(()) => {}
            Err(PeerError::HandshakeMismatch) => {
                info!(id = shared.id, "client disconnected (failed validation)");
                return;
            }
            Err(err) => {
                info!(id = shared.id, error = %err, "client disconnected during validation");
                return;
            }
        }

        if !shared.advance(ConnectionState::Ready) {
            return;
        }
        info!(id = shared.id, "client validated");
        on_validated(&self.handle);

        self.pump(stream).await;
    }

    /// Client side: connect, answer the handshake, then pump messages.
    pub(crate) async fn connect(self, addrs: Vec<SocketAddr>) {
        let shared = &self.guard.0;
        let token = shared.close.clone();
        if !shared.advance(ConnectionState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            _ = token.cancelled() => return,
            connected = TcpStream::connect(&addrs[..]) => connected,
        };
        let mut stream = match connected {
            Ok(stream) => stream,
            Err(err) => {
                warn!(?addrs, error = %err, "connect failed");
                return;
            }
        };
        if let Ok(addr) = stream.peer_addr() {
            let _ = shared.peer_addr.set(addr);
        }

        if !shared.advance(ConnectionState::AwaitingValidation) {
            return;
        }
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = handshake::client_handshake(&mut stream) => result,
        };
        if let Err(err) = result {
            warn!(error = %err, "handshake with server failed");
            return;
        }

        if !shared.advance(ConnectionState::Ready) {
            return;
        }
        debug!(peer = ?self.handle.peer_addr(), "connected to server");

        self.pump(stream).await;
    }

    /// Run the read and write pipelines until either fails or the
    /// connection is closed. Dropping `self` closes the connection.
    async fn pump(self, stream: TcpStream) {
        let Pipeline {
            guard,
            handle,
            mut outgoing,
            incoming,
            frame,
        } = self;
        let token = guard.0.close.clone();

        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, MessageCodec::new(frame.clone()));
        let writer = FramedWrite::new(write_half, MessageCodec::new(frame));

        let failure = tokio::select! {
            _ = token.cancelled() => None,
            err = read_pipeline(&handle, reader, &incoming) => Some(("read", err)),
            err = write_pipeline(&handle, writer, &mut outgoing) => Some(("write", err)),
        };

        match failure {
            Some((side, FrameError::ConnectionClosed)) => {
                debug!(id = handle.id(), side, "peer closed connection");
            }
            Some((side, err)) => {
                warn!(id = handle.id(), side, error = %err, "connection failed");
            }
            None => {}
        }
        // Anything still queued for writing is dropped along with `outgoing`.
        drop(guard);
    }
}

/// Read header then body, hand the message over, and go again.
async fn read_pipeline<T: MessageKind>(
    handle: &Connection<T>,
    mut reader: FramedRead<OwnedReadHalf, MessageCodec<T>>,
    incoming: &TsQueue<OwnedMessage<T>>,
) -> FrameError {
    let remote = (handle.role() == Role::Server).then(|| handle.id());
    loop {
        match reader.next().await {
            Some(Ok(msg)) => {
                trace!(id = handle.id(), %msg, "message received");
                incoming.push_back(OwnedMessage { remote, msg });
            }
            Some(Err(err)) => return err,
            None => return FrameError::ConnectionClosed,
        }
    }
}

/// Write queued messages one at a time, in the order they were sent.
async fn write_pipeline<T: MessageKind>(
    handle: &Connection<T>,
    mut writer: FramedWrite<OwnedWriteHalf, MessageCodec<T>>,
    requests: &mut mpsc::UnboundedReceiver<Message<T>>,
) -> FrameError {
    let queue = TsQueue::new();
    loop {
        let Some(msg) = requests.recv().await else {
            return FrameError::ConnectionClosed;
        };
        queue.push_back(msg);

        while let Some(next) = queue.pop_front() {
            trace!(id = handle.id(), msg = %next, "writing message");
            if let Err(err) = writer.send(next).await {
                return err;
            }
            handle.shared.release_unsent();
            while let Ok(more) = requests.try_recv() {
                queue.push_back(more);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremsg_frame::HEADER_SIZE;

    use super::*;
    use crate::handshake::scramble;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) =
            new_connection::<u32>(1000, Role::Server, None, incoming, FrameConfig::default());

        assert_eq!(conn.state(), ConnectionState::Created);
        assert!(conn.is_connected());
        conn.disconnect();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!pipeline.guard.0.advance(ConnectionState::Ready));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn dropping_pipeline_closes_connection() {
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) =
            new_connection::<u32>(7, Role::Client, None, incoming, FrameConfig::default());
        drop(pipeline);
        assert!(!conn.is_connected());
    }

    #[test]
    fn server_pipeline_validates_and_reads() {
        let (std_listener, addr) = listener();
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) = new_connection::<u32>(
            1000,
            Role::Server,
            None,
            Arc::clone(&incoming),
            FrameConfig::default(),
        );
        let nonce = 0x1122_3344_5566_7788u64;

        let validated = runtime().block_on(async move {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            let (validated_tx, validated_rx) = tokio::sync::oneshot::channel();

            let server = async move {
                let (stream, _) = listener.accept().await.unwrap();
                pipeline
                    .serve(stream, nonce, move |c| {
                        validated_tx.send(c.id()).unwrap();
                    })
                    .await;
            };

            let client = async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let mut received = [0u8; 8];
                stream.read_exact(&mut received).await.unwrap();
                assert_eq!(u64::from_ne_bytes(received), nonce);
                stream
                    .write_all(&scramble(nonce).to_ne_bytes())
                    .await
                    .unwrap();

                let mut wire = Vec::new();
                wire.extend_from_slice(&5u32.to_ne_bytes());
                wire.extend_from_slice(&3u32.to_ne_bytes());
                wire.extend_from_slice(b"abc");
                stream.write_all(&wire).await.unwrap();

                let id = validated_rx.await.unwrap();
                // Closing our side ends the server's read pipeline.
                drop(stream);
                id
            };

            let (_, id) = tokio::join!(server, client);
            id
        });

        assert_eq!(validated, 1000);
        assert!(!conn.is_connected());
        let owned = incoming.pop_front().unwrap();
        assert_eq!(owned.remote, Some(1000));
        assert_eq!(owned.msg.kind(), 5);
        assert_eq!(owned.msg.body(), b"abc");
    }

    #[test]
    fn server_pipeline_rejects_bad_response() {
        let (std_listener, addr) = listener();
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) = new_connection::<u32>(
            1000,
            Role::Server,
            None,
            Arc::clone(&incoming),
            FrameConfig::default(),
        );

        let validated = runtime().block_on(async move {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            let validated = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let flag = Arc::clone(&validated);

            let server = async move {
                let (stream, _) = listener.accept().await.unwrap();
                pipeline
                    .serve(stream, 9, move |_| flag.store(true, Ordering::SeqCst))
                    .await;
            };

            let client = async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let mut nonce = [0u8; 8];
                stream.read_exact(&mut nonce).await.unwrap();
                stream.write_all(&nonce).await.unwrap();

                // The server hangs up without a reply.
                let mut buf = [0u8; 1];
                let read = stream.read(&mut buf).await.unwrap_or(0);
                assert_eq!(read, 0);
            };

            tokio::join!(server, client);
            validated.load(Ordering::SeqCst)
        });

        assert!(!validated);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(incoming.is_empty());
    }

    #[test]
    fn client_pipeline_answers_and_writes_in_order() {
        let (std_listener, addr) = listener();
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) = new_connection::<u32>(
            0,
            Role::Client,
            None,
            Arc::clone(&incoming),
            FrameConfig::default(),
        );

        // Queued before the connection exists; must follow the handshake.
        for i in 0..3u32 {
            let mut msg = Message::new(1u32);
            msg.push(i);
            conn.send(msg);
        }
        assert_eq!(conn.unsent(), 3);

        let rt = runtime();
        let task = rt.spawn(pipeline.connect(vec![addr]));

        let frames = rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            let (mut stream, _) = listener.accept().await.unwrap();
            let nonce = 31337u64;
            stream.write_all(&nonce.to_ne_bytes()).await.unwrap();
            let mut response = [0u8; 8];
            stream.read_exact(&mut response).await.unwrap();
            assert_eq!(u64::from_ne_bytes(response), scramble(nonce));

            let mut frames = Vec::new();
            for _ in 0..3 {
                let mut header = [0u8; HEADER_SIZE];
                stream.read_exact(&mut header).await.unwrap();
                let mut body = [0u8; 4];
                stream.read_exact(&mut body).await.unwrap();
                frames.push((header, u32::from_ne_bytes(body)));
            }

            // And a message back to the client.
            let mut wire = Vec::new();
            wire.extend_from_slice(&2u32.to_ne_bytes());
            wire.extend_from_slice(&0u32.to_ne_bytes());
            stream.write_all(&wire).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            frames
        });

        for (i, (header, value)) in frames.iter().enumerate() {
            assert_eq!(&header[..4], &1u32.to_ne_bytes());
            assert_eq!(&header[4..], &4u32.to_ne_bytes());
            assert_eq!(*value, i as u32);
        }
        assert!(conn.is_ready());
        assert_eq!(conn.unsent(), 0);
        assert_eq!(conn.peer_addr(), Some(addr));

        let owned = incoming.pop_front().unwrap();
        assert_eq!(owned.remote, None);
        assert_eq!(owned.msg.kind(), 2);
        assert!(owned.msg.is_empty());

        conn.disconnect();
        rt.block_on(task).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn client_connect_failure_closes() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let (listener, addr) = listener();
            drop(listener);
            addr
        };
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) =
            new_connection::<u32>(0, Role::Client, None, incoming, FrameConfig::default());

        runtime().block_on(pipeline.connect(vec![addr]));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_connected());
    }

    #[test]
    fn send_after_close_is_dropped() {
        let incoming = Arc::new(TsQueue::new());
        let (conn, _pipeline) =
            new_connection::<u32>(0, Role::Client, None, incoming, FrameConfig::default());
        conn.disconnect();
        conn.send(Message::new(1u32));
        assert!(!conn.is_connected());
    }

    #[test]
    fn closing_discards_unsent_messages() {
        let incoming = Arc::new(TsQueue::new());
        let (conn, pipeline) =
            new_connection::<u32>(0, Role::Client, None, incoming, FrameConfig::default());
        conn.send(Message::new(1u32));
        conn.send(Message::new(2u32));
        assert_eq!(conn.unsent(), 2);

        conn.disconnect();
        drop(pipeline);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.unsent(), 0);
        assert_eq!(conn.shared.unsent.load(Ordering::Acquire), 0);
    }
}
