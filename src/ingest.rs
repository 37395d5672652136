//! Ingest stage: a pure UDP pump. Binds a socket, and for every datagram
//! copies it into a NUL-terminated buffer, pushes the payload onto `raw`,
//! and increments `received`. Never parses.

use std::net::UdpSocket;
use std::sync::Arc;

use crate::channel::Channel;
use crate::stats::{Counter, StatsRegistry};

/// Datagrams are truncated to this many bytes before a terminating NUL is
/// appended, matching the fixed 8192-byte receive buffer.
pub const MAX_DATAGRAM: usize = 8192;

pub fn bind(addr: &str) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)?;
    tracing::info!(%addr, "ingest bound");
    Ok(socket)
}

/// Runs the ingest stage to completion. Only returns once `raw.close()` has
/// been called from elsewhere and the socket has been shut down (there is
/// no clean way to interrupt a blocking `recv_from`, so in practice this
/// loop runs until the process is asked to exit and the socket is dropped
/// out from under it, which surfaces as a terminal recv error).
pub fn run(socket: UdpSocket, raw: Arc<Channel>, stats: Arc<StatsRegistry>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    tracing::info!("ingest stage started");

    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, _src)) => {
                let payload = decode_datagram(&buf[..n]);
                raw.push(payload);
                stats.increment(Counter::Received);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                if is_shutdown_error(&e) {
                    tracing::info!("ingest socket closed, stage shutting down");
                    break;
                }
                tracing::warn!(error = %e, "ingest recv_from failed, continuing");
            }
        }
    }
}

fn is_shutdown_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotConnected | std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::InvalidInput
    )
}

/// Truncate to `MAX_DATAGRAM - 1` bytes and ensure the result is valid
/// UTF-8 (lossily, if truncation split a multi-byte sequence) — datagrams
/// over the buffer size lose their tail, matching a fixed-size receive
/// buffer with a trailing NUL.
fn decode_datagram(bytes: &[u8]) -> String {
    let truncated = if bytes.len() >= MAX_DATAGRAM {
        &bytes[..MAX_DATAGRAM - 1]
    } else {
        bytes
    };
    String::from_utf8_lossy(truncated).into_owned()
}
