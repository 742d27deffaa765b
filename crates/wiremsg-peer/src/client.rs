use std::sync::Arc;

use tracing::{debug, info};
use wiremsg_frame::{FrameConfig, Message, MessageKind};
use wiremsg_transport::{resolve, Reactor};

use crate::connection::{new_connection, Connection, OwnedMessage, Role};
use crate::error::Result;
use crate::queue::TsQueue;

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub frame: FrameConfig,
    /// Name of the reactor thread.
    pub thread_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            thread_name: "wiremsg-client".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Client endpoint: one connection to one server.
///
/// ```no_run
/// use wiremsg_frame::Message;
/// use wiremsg_peer::Client;
///
/// let mut client = Client::<u32>::new();
/// client.connect("127.0.0.1", 60000)?;
/// client.send(Message::new(1));
///
/// client.wait_for_message();
/// if let Some(reply) = client.incoming().pop_front() {
///     println!("{reply}");
/// }
/// # Ok::<(), wiremsg_peer::PeerError>(())
/// ```
pub struct Client<T: MessageKind> {
    config: ClientConfig,
    incoming: Arc<TsQueue<OwnedMessage<T>>>,
    reactor: Option<Reactor>,
    connection: Option<Connection<T>>,
}

impl<T: MessageKind> Client<T> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            incoming: Arc::new(TsQueue::new()),
            reactor: None,
            connection: None,
        }
    }

    /// Resolve `host:port` and start connecting in the background.
    ///
    /// Only resolution and reactor setup errors are returned. Whether the
    /// connection and handshake succeed shows up later through
    /// [`is_connected`](Self::is_connected) and [`is_ready`](Self::is_ready).
    /// Any previous connection is dropped first.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.disconnect();

        let addrs = resolve(host, port)?;
        let (connection, pipeline) = new_connection(
            0,
            Role::Client,
            None,
            Arc::clone(&self.incoming),
            self.config.frame.clone(),
        );
        let reactor = Reactor::start(self.config.thread_name.clone())?;
        info!(host, port, "connecting");
        reactor.spawn(pipeline.connect(addrs))?;

        self.connection = Some(connection);
        self.reactor = Some(reactor);
        Ok(())
    }

    /// Close the connection, stop the reactor and join its thread. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.as_ref() {
            connection.disconnect();
        }
        if let Some(mut reactor) = self.reactor.take() {
            reactor.stop();
            debug!("client disconnected");
        }
        self.incoming.wake();
    }

    /// True while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// True once the server has accepted the handshake.
    pub fn is_ready(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_ready())
    }

    /// Send a message to the server. Dropped if not connected.
    pub fn send(&self, msg: Message<T>) {
        match self.connection.as_ref() {
            Some(connection) if connection.is_connected() => connection.send(msg),
            _ => debug!(%msg, "send while not connected dropped"),
        }
    }

    /// Messages received from the server, oldest first.
    pub fn incoming(&self) -> &TsQueue<OwnedMessage<T>> {
        &self.incoming
    }

    /// Block until at least one message is waiting, or the client is
    /// disconnected.
    pub fn wait_for_message(&self) {
        self.incoming.wait();
    }

    /// Handle to the current connection, if any.
    pub fn connection(&self) -> Option<&Connection<T>> {
        self.connection.as_ref()
    }
}

impl<T: MessageKind> Default for Client<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MessageKind> Drop for Client<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: MessageKind> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("pending", &self.incoming.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::PeerError;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn new_client_is_not_connected() {
        let client = Client::<u32>::new();
        assert!(!client.is_connected());
        assert!(!client.is_ready());
        assert!(client.connection().is_none());
        client.send(Message::new(1));
        assert!(client.incoming().is_empty());
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let mut client = Client::<u32>::new();
        let err = client.connect("no such host.invalid", 1).unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
        assert!(!client.is_connected());
    }

    #[test]
    fn refused_connection_ends_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client = Client::<u32>::new();
        client.connect("127.0.0.1", port).unwrap();
        assert!(wait_until(|| !client.is_connected()));
        assert!(!client.is_ready());
    }

    #[test]
    fn silent_server_leaves_client_awaiting_validation() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = Client::<u32>::new();
        client.connect("127.0.0.1", port).unwrap();
        let (_socket, _) = listener.accept().unwrap();

        assert!(wait_until(|| {
            client.connection().map(Connection::state)
                == Some(crate::ConnectionState::AwaitingValidation)
        }));
        assert!(client.is_connected());
        assert!(!client.is_ready());

        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[test]
    fn disconnect_releases_waiter() {
        let client = Client::<u32>::with_config(
            ClientConfig::default().with_thread_name("client-test"),
        );
        let waiter = {
            let incoming = Arc::clone(&client.incoming);
            std::thread::spawn(move || {
                incoming.wait();
            })
        };
        let mut client = client;
        while !waiter.is_finished() {
            client.disconnect();
            std::thread::sleep(Duration::from_millis(5));
        }
        waiter.join().unwrap();
    }
}
