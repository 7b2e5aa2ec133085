//! Socket utilities and tuning

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::net::{IpAddr, Shutdown, SocketAddr};

/// Pending connection queue length
pub const LISTEN_BACKLOG: i32 = 1024;

/// Create a non-blocking TCP listener for the stats endpoint
pub fn create_tcp_listener(addr: SocketAddr) -> Result<std::net::TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Enable address reuse
    socket.set_reuse_address(true)?;

    // Responses are written in one go; don't hold the tail back
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind {}", addr))?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Stop reading from a connected stream while keeping the write side open
#[cfg(unix)]
pub fn shutdown_read<S: std::os::fd::AsFd>(stream: &S) -> std::io::Result<()> {
    SockRef::from(stream).shutdown(Shutdown::Read)
}

/// Stop reading from a connected stream while keeping the write side open
#[cfg(windows)]
pub fn shutdown_read<S: std::os::windows::io::AsSocket>(stream: &S) -> std::io::Result<()> {
    SockRef::from(stream).shutdown(Shutdown::Read)
}

/// Fold IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) back to IPv4
pub fn canonical_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
