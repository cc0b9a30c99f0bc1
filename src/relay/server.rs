//! The server relay: terminates the obfuscated tunnel, runs the SOCKS5
//! CONNECT state machine, and pipes bytes to the real destination.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info};

use crate::cipher::Cipher;
use crate::error::AppError;
use crate::secure_stream::{decode_copy, encode_copy, DecodingReader, EncodingWriter};
use crate::socks5::{self, Address};

pub async fn run(
    server_addr: &str,
    cipher: Arc<Cipher>,
    on_bound: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(server_addr).await?;
    let bound = listener.local_addr()?;
    info!(addr = %bound, "server relay listening");
    if let Some(tx) = on_bound {
        let _ = tx.send(bound);
    }

    loop {
        let (inbound, peer) = listener.accept().await?;
        debug!(%peer, "accepted tunnel connection");
        let cipher = cipher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(inbound, cipher).await {
                debug!(%peer, error = %e, "session ended");
            }
        });
    }
}

async fn handle_connection(mut inbound: TcpStream, cipher: Arc<Cipher>) -> Result<(), AppError> {
    let (inbound_rd, inbound_wr) = inbound.split();
    let mut decoding_rd = DecodingReader::new(inbound_rd, cipher.clone());
    let mut encoding_wr = EncodingWriter::new(inbound_wr, cipher.clone());

    // H0/H1: greeting and method negotiation.
    socks5::read_greeting(&mut decoding_rd).await?;
    encoding_wr.write_all(&[socks5::VERSION, socks5::METHOD_NO_AUTH]).await?;

    // H2: CONNECT request.
    let address = socks5::read_request(&mut decoding_rd).await?;

    // H3: dial the real destination.
    let mut dst = dial(&address).await?;

    // H4: fixed success reply, regardless of what happens next.
    encoding_wr.write_all(&socks5::REPLY_SUCCESS).await?;

    // H5: relay.
    let inbound_rd = decoding_rd.into_inner();
    let inbound_wr = encoding_wr.into_inner();
    let (dst_rd, dst_wr) = dst.split();

    let to_dst = decode_copy(&cipher, inbound_rd, dst_wr);
    let to_inbound = encode_copy(&cipher, dst_rd, inbound_wr);

    // Race the two directions: whichever finishes first (EOF or error) drops
    // the other future immediately, rather than leaving it blocked on a read
    // from a peer that will never send more. Both sockets close for real
    // when `inbound`/`dst` go out of scope below.
    tokio::select! {
        result = to_dst => {
            if let Err(e) = result {
                debug!(error = %e, "client-to-destination copy ended");
            }
        }
        result = to_inbound => {
            if let Err(e) = result {
                debug!(error = %e, "destination-to-client copy ended");
            }
        }
    }
    Ok(())
}

/// Dials `address`, resolving domain names via `lookup_host` and trying
/// each candidate address in order until one connects.
async fn dial(address: &Address) -> Result<TcpStream, AppError> {
    match address {
        Address::Ipv4(..) | Address::Ipv6(..) => {
            let host_port = address.to_host_port();
            TcpStream::connect(&host_port)
                .await
                .map_err(|source| AppError::DialFailed { addr: host_port, source })
        }
        Address::Domain(host, port) => {
            let host_port = format!("{host}:{port}");
            let candidates = lookup_host(&host_port)
                .await
                .map_err(|source| AppError::DialFailed { addr: host_port.clone(), source })?;

            let mut last_err = None;
            for candidate in candidates {
                match TcpStream::connect(candidate).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(AppError::DialFailed {
                addr: host_port,
                source: last_err.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start_server(cipher: Arc<Cipher>) -> SocketAddr {
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = run("127.0.0.1:0", cipher, Some(tx)).await;
        });
        rx.await.unwrap()
    }

    async fn connect_and_greet(addr: SocketAddr, cipher: &Cipher) -> TcpStream {
        let mut sock = TcpStream::connect(addr).await.unwrap();
        let mut greeting = vec![socks5::VERSION, 0x01, 0x00];
        cipher.encode(&mut greeting);
        sock.write_all(&greeting).await.unwrap();

        let mut reply = [0u8; 2];
        sock.read_exact(&mut reply).await.unwrap();
        cipher.decode(&mut reply);
        assert_eq!(reply, [socks5::VERSION, socks5::METHOD_NO_AUTH]);
        sock
    }

    #[tokio::test]
    async fn ipv4_connect_relays_bytes_to_destination() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let dest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest_addr = match dest.local_addr().unwrap() {
            SocketAddr::V4(a) => a,
            _ => unreachable!(),
        };

        let mut sock = connect_and_greet(server_addr, &cipher).await;

        let mut req = vec![socks5::VERSION, socks5::CMD_CONNECT, 0x00, socks5::ATYP_IPV4];
        req.extend_from_slice(&dest_addr.ip().octets());
        req.extend_from_slice(&dest_addr.port().to_be_bytes());
        cipher.encode(&mut req);
        sock.write_all(&req).await.unwrap();

        let (mut dest_sock, _) = dest.accept().await.unwrap();

        let mut reply = [0u8; 10];
        sock.read_exact(&mut reply).await.unwrap();
        cipher.decode(&mut reply);
        assert_eq!(reply, socks5::REPLY_SUCCESS);

        let mut payload = b"hello world".to_vec();
        cipher.encode(&mut payload);
        sock.write_all(&payload).await.unwrap();

        let mut buf = [0u8; 32];
        let n = dest_sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[tokio::test]
    async fn ipv6_connect_relays_bytes_to_destination() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let dest = TcpListener::bind("[::1]:0").await.unwrap();
        let dest_addr = match dest.local_addr().unwrap() {
            SocketAddr::V6(a) => a,
            _ => unreachable!(),
        };

        let mut sock = connect_and_greet(server_addr, &cipher).await;

        let mut req = vec![socks5::VERSION, socks5::CMD_CONNECT, 0x00, socks5::ATYP_IPV6];
        req.extend_from_slice(&dest_addr.ip().octets());
        req.extend_from_slice(&dest_addr.port().to_be_bytes());
        cipher.encode(&mut req);
        sock.write_all(&req).await.unwrap();

        let (mut dest_sock, _) = dest.accept().await.unwrap();

        let mut reply = [0u8; 10];
        sock.read_exact(&mut reply).await.unwrap();
        cipher.decode(&mut reply);
        assert_eq!(reply, socks5::REPLY_SUCCESS);

        let mut payload = b"v6 hello".to_vec();
        cipher.encode(&mut payload);
        sock.write_all(&payload).await.unwrap();

        let mut buf = [0u8; 32];
        let n = dest_sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"v6 hello");
    }

    #[tokio::test]
    async fn domain_connect_relays_bytes_to_destination() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let dest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest_port = dest.local_addr().unwrap().port();

        let mut sock = connect_and_greet(server_addr, &cipher).await;

        let host = b"localhost";
        let mut req = vec![socks5::VERSION, socks5::CMD_CONNECT, 0x00, socks5::ATYP_DOMAIN, host.len() as u8];
        req.extend_from_slice(host);
        req.extend_from_slice(&dest_port.to_be_bytes());
        cipher.encode(&mut req);
        sock.write_all(&req).await.unwrap();

        let (mut dest_sock, _) = dest.accept().await.unwrap();

        let mut reply = [0u8; 10];
        sock.read_exact(&mut reply).await.unwrap();
        cipher.decode(&mut reply);
        assert_eq!(reply, socks5::REPLY_SUCCESS);

        let mut payload = b"via domain".to_vec();
        cipher.encode(&mut payload);
        sock.write_all(&payload).await.unwrap();

        let mut buf = [0u8; 32];
        let n = dest_sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"via domain");
    }

    #[tokio::test]
    async fn version_rejection_closes_connection() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let mut sock = TcpStream::connect(server_addr).await.unwrap();
        let mut greeting = vec![0x04u8];
        cipher.encode(&mut greeting);
        sock.write_all(&greeting).await.unwrap();
        sock.shutdown().await.unwrap();

        let mut buf = [0u8; 8];
        let n = sock.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn short_request_closes_connection() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let mut sock = connect_and_greet(server_addr, &cipher).await;
        let mut short = vec![socks5::VERSION, socks5::CMD_CONNECT, 0x01];
        cipher.encode(&mut short);
        sock.write_all(&short).await.unwrap();
        sock.shutdown().await.unwrap();

        let mut buf = [0u8; 8];
        let n = sock.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn unsupported_atyp_closes_connection() {
        let cipher = Arc::new(Cipher::new(&Key::generate()));
        let server_addr = start_server(cipher.clone()).await;

        let mut sock = connect_and_greet(server_addr, &cipher).await;
        let mut req = vec![socks5::VERSION, socks5::CMD_CONNECT, 0x01, 0x02, 0xff, 0xff, 0xff];
        cipher.encode(&mut req);
        sock.write_all(&req).await.unwrap();
        sock.shutdown().await.unwrap();

        let mut buf = [0u8; 8];
        let n = sock.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
