use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{PeerError, Result};

/// Bytes exchanged in each direction: one native-endian u64.
pub const HANDSHAKE_SIZE: usize = 8;

const SCRAMBLE_IN: u64 = 0xDEAD_BEEF_C0DE_CAFE;
const SCRAMBLE_OUT: u64 = 0xC0DE_FACE_1234_5678;
// Seven bytes wide: the top byte is cleared by the swap and only picks up
// SCRAMBLE_OUT, so every response starts with 0xC0. Peers depend on this.
const NIBBLE_HIGH: u64 = 0x00F0_F0F0_F0F0_F0F0;
const NIBBLE_LOW: u64 = 0x000F_0F0F_0F0F_0F0F;

/// Produces the nonce a server sends to each new connection.
pub type NonceSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Transform a nonce into the response a client must send back.
pub fn scramble(input: u64) -> u64 {
    let out = input ^ SCRAMBLE_IN;
    let out = ((out & NIBBLE_HIGH) >> 4) | ((out & NIBBLE_LOW) << 4);
    out ^ SCRAMBLE_OUT
}

/// Nonce from the wall clock: nanoseconds since the Unix epoch.
pub fn clock_nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Server side: send `nonce`, then check the client's answer.
///
/// Fails with [`PeerError::HandshakeMismatch`] if the answer is not
/// `scramble(nonce)`.
pub async fn server_handshake<S>(stream: &mut S, nonce: u64) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected = scramble(nonce).to_ne_bytes();

    stream.write_all(&nonce.to_ne_bytes()).await?;
    stream.flush().await?;

    let mut response = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut response).await?;

    if response != expected {
        return Err(PeerError::HandshakeMismatch);
    }
    Ok(())
}

/// Client side: read the server's nonce and answer it.
///
/// The server sends no confirmation; a wrong answer shows up as the
/// connection being closed.
pub async fn client_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut nonce).await?;

    let response = scramble(u64::from_ne_bytes(nonce));
    stream.write_all(&response.to_ne_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
