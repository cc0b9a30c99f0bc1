//! RFC 1928 wire constants and the CONNECT-only address parsing used by
//! the server relay's handshake.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::AppError;

pub const VERSION: u8 = 0x05;

pub const METHOD_NO_AUTH: u8 = 0x00;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// The fixed reply this implementation always sends after a CONNECT
/// request, success or not: VER=5, REP=0 (succeeded), RSV=0, ATYP=IPv4,
/// BND.ADDR=0.0.0.0, BND.PORT=0. Callers that need the real outcome
/// watch the tunnel for an immediate close instead of the REP byte.
pub const REPLY_SUCCESS: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

/// A parsed CONNECT destination: either an IP literal or a domain name
/// plus port, exactly as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(std::net::Ipv4Addr, u16),
    Ipv6(std::net::Ipv6Addr, u16),
    Domain(String, u16),
}

impl Address {
    /// A `host:port` string suitable for `tokio::net::lookup_host` / `TcpStream::connect`.
    pub fn to_host_port(&self) -> String {
        match self {
            Address::Ipv4(ip, port) => format!("{ip}:{port}"),
            Address::Ipv6(ip, port) => format!("[{ip}]:{port}"),
            Address::Domain(host, port) => format!("{host}:{port}"),
        }
    }
}

/// Reads and validates the method-negotiation greeting, ignoring the
/// offered method list beyond its length (we only ever accept no-auth).
pub async fn read_greeting<R: AsyncRead + Unpin>(stream: &mut R) -> Result<(), AppError> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    let [ver, nmethods] = header;
    if ver != VERSION {
        return Err(AppError::ProtocolViolation(format!(
            "unsupported SOCKS version {ver}"
        )));
    }
    let mut methods = vec![0u8; nmethods as usize];
    stream.read_exact(&mut methods).await?;
    Ok(())
}

/// Reads a CONNECT request and returns its destination address. The VER
/// byte is not checked here — only the greeting enforces it — matching
/// the original server, which never inspects it on this frame. Rejects
/// any non-CONNECT command or unsupported address type.
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Address, AppError> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [_ver, cmd, _rsv, atyp] = header;
    if cmd != CMD_CONNECT {
        return Err(AppError::ProtocolViolation(format!(
            "unsupported command {cmd}"
        )));
    }

    match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await?;
            let port = read_port(stream).await?;
            Ok(Address::Ipv4(std::net::Ipv4Addr::from(buf), port))
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16];
            stream.read_exact(&mut buf).await?;
            let port = read_port(stream).await?;
            Ok(Address::Ipv6(std::net::Ipv6Addr::from(buf), port))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut buf = vec![0u8; len[0] as usize];
            stream.read_exact(&mut buf).await?;
            let host = String::from_utf8(buf)
                .map_err(|_| AppError::ProtocolViolation("domain is not valid utf-8".into()))?;
            let port = read_port(stream).await?;
            Ok(Address::Domain(host, port))
        }
        other => Err(AppError::ProtocolViolation(format!(
            "unsupported address type {other}"
        ))),
    }
}

async fn read_port<R: AsyncRead + Unpin>(stream: &mut R) -> Result<u16, AppError> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;
    Ok(u16::from_be_bytes(buf))
}
