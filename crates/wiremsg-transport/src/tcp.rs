use std::net::{Ipv4Addr, SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Resolve a host name or IP literal plus port into socket addresses.
///
/// This is the only transport step that runs synchronously on the caller's
/// thread, so it is the only one whose failure is reported directly.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            target: target.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::NoAddress { target });
    }

    debug!(%target, count = addrs.len(), "resolved address");
    Ok(addrs)
}

/// A bound, listening TCP socket waiting to be handed to a reactor.
///
/// Binding happens eagerly so that address-in-use and permission errors
/// surface from the constructor instead of inside the reactor.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr,
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Bind on every IPv4 interface at `port`.
    pub fn bind_port(port: u16) -> Result<Self> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Convert into an async listener.
    ///
    /// Must be called from within the reactor's runtime.
    pub fn into_async(self) -> Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::from_std(self.listener).map_err(TransportError::Io)
    }
}

impl std::fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
