//! Datagram transport to actuators.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use lumina_core::{Error, Result};

/// One-shot delivery of a payload to an address.
pub trait Transport: Send + Sync {
    fn send_to(&self, addr: SocketAddr, payload: &[u8]) -> io::Result<()>;
}

/// UDP sender. One command per datagram, no framing, no reply.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a local socket with a bounded write timeout.
    pub fn bind(bind: &str, send_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(bind)
            .map_err(|e| Error::Device(format!("Cannot bind UDP socket on {bind}: {e}")))?;
        socket.set_write_timeout(Some(send_timeout))?;
        socket.set_broadcast(true)?;

        tracing::info!(
            "UDP transport bound to {} (send timeout {:?})",
            socket.local_addr()?,
            send_timeout
        );

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, addr: SocketAddr, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, addr)?;
        if sent == payload.len() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {sent} of {} bytes", payload.len()),
            ))
        }
    }
}
