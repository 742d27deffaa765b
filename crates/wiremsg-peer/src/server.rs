use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use wiremsg_frame::{FrameConfig, Message, MessageKind};
use wiremsg_transport::{Reactor, TcpEndpoint};

use crate::connection::{new_connection, ClientId, Connection, OwnedMessage, Role};
use crate::error::{PeerError, Result};
use crate::handshake::{clock_nonce, NonceSource};
use crate::queue::TsQueue;

/// Identity given to the first client a server accepts.
pub const FIRST_CLIENT_ID: ClientId = 1000;

/// Application hooks a [`Server`] invokes.
///
/// `on_client_connect`, `on_client_validated` and `on_client_disconnect`
/// run on the reactor thread or whichever thread noticed the disconnect;
/// keep them short. `on_message` runs on the thread calling
/// [`Server::update`].
pub trait ServerHandler<T: MessageKind>: Send + Sync + 'static {
    /// Veto a new connection before it gets an identity.
    fn on_client_connect(&self, _addr: SocketAddr) -> bool {
        true
    }

    /// The client answered the handshake correctly.
    fn on_client_validated(&self, _client: &Connection<T>) {}

    /// The client was removed from the registry.
    fn on_client_disconnect(&self, _id: ClientId) {}

    fn on_message(&self, _server: &Server<T>, _client: ClientId, _msg: Message<T>) {}
}

/// Configuration for a [`Server`].
#[derive(Clone)]
pub struct ServerConfig {
    pub frame: FrameConfig,
    pub first_client_id: ClientId,
    /// Name of the reactor thread.
    pub thread_name: String,
    nonce: NonceSource,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            first_client_id: FIRST_CLIENT_ID,
            thread_name: "wiremsg-server".to_string(),
            nonce: Arc::new(clock_nonce),
        }
    }
}

impl ServerConfig {
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_first_client_id(mut self, id: ClientId) -> Self {
        self.first_client_id = id;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Replace the wall-clock nonce source.
    pub fn with_nonce_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.nonce = Arc::new(source);
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("frame", &self.frame)
            .field("first_client_id", &self.first_client_id)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

struct Registry<T> {
    connections: BTreeMap<ClientId, Connection<T>>,
    next_id: ClientId,
}

type SharedRegistry<T> = Arc<Mutex<Registry<T>>>;

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server endpoint: accepts clients, validates them, and dispatches their
/// messages to a [`ServerHandler`].
///
/// Connections live in a registry keyed by [`ClientId`]. Identities start at
/// [`FIRST_CLIENT_ID`] and are never reused within one server.
pub struct Server<T: MessageKind> {
    config: ServerConfig,
    handler: Arc<dyn ServerHandler<T>>,
    registry: SharedRegistry<T>,
    incoming: Arc<TsQueue<OwnedMessage<T>>>,
    endpoint: Option<TcpEndpoint>,
    local_addr: SocketAddr,
    reactor: Option<Reactor>,
}

impl<T: MessageKind> Server<T> {
    /// Bind the listening socket. Nothing is accepted until [`start`](Self::start).
    pub fn bind<H: ServerHandler<T>>(addr: SocketAddr, handler: H) -> Result<Self> {
        Self::bind_with_config(addr, handler, ServerConfig::default())
    }

    /// Bind on all interfaces at `port`.
    pub fn bind_port<H: ServerHandler<T>>(port: u16, handler: H) -> Result<Self> {
        let endpoint = TcpEndpoint::bind_port(port)?;
        Ok(Self::with_endpoint(endpoint, handler, ServerConfig::default()))
    }

    pub fn bind_with_config<H: ServerHandler<T>>(
        addr: SocketAddr,
        handler: H,
        config: ServerConfig,
    ) -> Result<Self> {
        let endpoint = TcpEndpoint::bind(addr)?;
        Ok(Self::with_endpoint(endpoint, handler, config))
    }

    fn with_endpoint<H: ServerHandler<T>>(
        endpoint: TcpEndpoint,
        handler: H,
        config: ServerConfig,
    ) -> Self {
        let local_addr = endpoint.local_addr();
        let registry = Registry {
            connections: BTreeMap::new(),
            next_id: config.first_client_id,
        };
        Self {
            config,
            handler: Arc::new(handler),
            registry: Arc::new(Mutex::new(registry)),
            incoming: Arc::new(TsQueue::new()),
            endpoint: Some(endpoint),
            local_addr,
            reactor: None,
        }
    }

    /// Start the reactor and begin accepting clients.
    pub fn start(&mut self) -> Result<()> {
        let endpoint = self.endpoint.take().ok_or(PeerError::AlreadyStarted)?;
        let reactor = Reactor::start(self.config.thread_name.clone())?;

        let acceptor = Acceptor {
            handler: Arc::clone(&self.handler),
            registry: Arc::clone(&self.registry),
            incoming: Arc::clone(&self.incoming),
            frame: self.config.frame.clone(),
            nonce: Arc::clone(&self.config.nonce),
        };
        reactor.spawn(acceptor.run(endpoint))?;

        info!(addr = %self.local_addr, "server started");
        self.reactor = Some(reactor);
        Ok(())
    }

    /// Stop the reactor and join its thread. Every connection closes.
    pub fn stop(&mut self) {
        if let Some(mut reactor) = self.reactor.take() {
            reactor.stop();
            info!(addr = %self.local_addr, "server stopped");
        }
        self.incoming.wake();
    }

    pub fn is_running(&self) -> bool {
        self.reactor.as_ref().is_some_and(Reactor::is_running)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send to one client. A closed client is pruned and reported
    /// disconnected instead.
    pub fn message_client(&self, id: ClientId, msg: Message<T>) {
        let connection = lock(&self.registry).connections.get(&id).cloned();
        match connection {
            Some(connection) if connection.is_connected() => connection.send(msg),
            Some(_) => self.prune(&[id]),
            None => debug!(id, "message for unknown client dropped"),
        }
    }

    /// Send to every open client except `exclude`. Closed clients found
    /// during the sweep are pruned afterwards.
    pub fn broadcast(&self, msg: &Message<T>, exclude: Option<ClientId>) {
        let mut closed = Vec::new();
        {
            let registry = lock(&self.registry);
            for (&id, connection) in &registry.connections {
                if !connection.is_connected() {
                    closed.push(id);
                } else if Some(id) != exclude {
                    connection.send(msg.clone());
                }
            }
        }
        if !closed.is_empty() {
            self.prune(&closed);
        }
    }

    /// Dispatch up to `max` received messages (all if `None`) to
    /// [`ServerHandler::on_message`] on the calling thread.
    ///
    /// With `block`, first waits until a message arrives or the server is
    /// stopped. Returns how many messages were dispatched.
    pub fn update(&self, max: Option<usize>, block: bool) -> usize {
        if block {
            self.incoming.wait();
        }

        let mut dispatched = 0;
        while max.is_none_or(|max| dispatched < max) {
            let Some(owned) = self.incoming.pop_front() else {
                break;
            };
            let Some(id) = owned.remote else {
                continue;
            };
            self.handler.on_message(self, id, owned.msg);
            dispatched += 1;
        }
        dispatched
    }

    /// Close a client and remove it from the registry.
    pub fn disconnect_client(&self, id: ClientId) {
        let connection = lock(&self.registry).connections.get(&id).cloned();
        if let Some(connection) = connection {
            connection.disconnect();
            self.prune(&[id]);
        }
    }

    /// Handle to a registered client.
    pub fn client(&self, id: ClientId) -> Option<Connection<T>> {
        lock(&self.registry).connections.get(&id).cloned()
    }

    /// Registered client identities, ascending.
    pub fn client_ids(&self) -> Vec<ClientId> {
        lock(&self.registry).connections.keys().copied().collect()
    }

    pub fn client_count(&self) -> usize {
        lock(&self.registry).connections.len()
    }

    /// Messages received but not yet dispatched.
    pub fn incoming(&self) -> &TsQueue<OwnedMessage<T>> {
        &self.incoming
    }

    fn prune(&self, ids: &[ClientId]) {
        prune(&self.registry, self.handler.as_ref(), ids);
    }
}

impl<T: MessageKind> Drop for Server<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: MessageKind> std::fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Remove `ids` from the registry, then notify the handler outside the lock.
fn prune<T: MessageKind>(
    registry: &Mutex<Registry<T>>,
    handler: &dyn ServerHandler<T>,
    ids: &[ClientId],
) {
    let removed: Vec<ClientId> = {
        let mut registry = lock(registry);
        ids.iter()
            .copied()
            .filter(|id| registry.connections.remove(id).is_some())
            .collect()
    };
    for id in removed {
        info!(id, "removing client");
        handler.on_client_disconnect(id);
    }
}

/// The accept loop's share of the server state.
struct Acceptor<T: MessageKind> {
    handler: Arc<dyn ServerHandler<T>>,
    registry: SharedRegistry<T>,
    incoming: Arc<TsQueue<OwnedMessage<T>>>,
    frame: FrameConfig,
    nonce: NonceSource,
}

impl<T: MessageKind> Acceptor<T> {
    async fn run(self, endpoint: TcpEndpoint) {
        let listener = match endpoint.into_async() {
            Ok(listener) => listener,
            Err(err) => {
                warn!(error = %err, "listener could not join the reactor");
                return;
            }
        };

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(err) => warn!(error = %err, "accept failed"),
            }
        }
    }

    fn admit(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        if !self.handler.on_client_connect(addr) {
            info!(%addr, "connection denied");
            return;
        }

        let (connection, pipeline) = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            let (connection, pipeline) = new_connection(
                id,
                Role::Server,
                Some(addr),
                Arc::clone(&self.incoming),
                self.frame.clone(),
            );
            registry.connections.insert(id, connection.clone());
            (connection, pipeline)
        };
        info!(id = connection.id(), %addr, "new connection");

        let handler = Arc::clone(&self.handler);
        let nonce = (self.nonce)();
        tokio::spawn(pipeline.serve(stream, nonce, move |client| {
            handler.on_client_validated(client);
        }));
    }
}
