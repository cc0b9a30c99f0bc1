//! The local relay: accepts client connections, dials the server relay,
//! and shuttles obfuscated bytes between them. It never looks at the
//! SOCKS5 bytes it carries.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::cipher::Cipher;
use crate::error::AppError;
use crate::secure_stream::{decode_copy, encode_copy};

/// Binds `local_addr` and relays every accepted connection to
/// `server_addr` until the process is asked to stop. `on_bound`, if
/// given, receives the actual bound address — used by tests to pick up
/// an ephemeral port.
pub async fn run(
    local_addr: &str,
    server_addr: SocketAddr,
    cipher: Arc<Cipher>,
    on_bound: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(local_addr).await?;
    let bound = listener.local_addr()?;
    info!(addr = %bound, "local relay listening");
    if let Some(tx) = on_bound {
        let _ = tx.send(bound);
    }

    loop {
        let (client, peer) = listener.accept().await?;
        debug!(%peer, "accepted client connection");
        let cipher = cipher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(client, server_addr, cipher).await {
                debug!(%peer, error = %e, "session ended");
            }
        });
    }
}

async fn handle_connection(
    mut client: TcpStream,
    server_addr: SocketAddr,
    cipher: Arc<Cipher>,
) -> Result<(), AppError> {
    let mut server = TcpStream::connect(server_addr).await.map_err(|source| AppError::DialFailed {
        addr: server_addr.to_string(),
        source,
    })?;

    let (client_rd, client_wr) = client.split();
    let (server_rd, server_wr) = server.split();

    let to_server = encode_copy(&cipher, client_rd, server_wr);
    let to_client = decode_copy(&cipher, server_rd, client_wr);

    // Race the two directions: whichever finishes first (EOF or error) drops
    // the other future immediately, rather than leaving it blocked on a read
    // from a peer that will never send more. Both sockets close for real
    // when `client`/`server` go out of scope below.
    tokio::select! {
        result = to_server => {
            if let Err(e) = result {
                debug!(error = %e, "client-to-server copy ended");
            }
        }
        result = to_client => {
            if let Err(e) = result {
                debug!(error = %e, "server-to-client copy ended");
            }
        }
    }
    Ok(())
}
