//! [`ClientHandle`]: a leased connection to one candidate device.
//!
//! TCP and UDP handles own their `tokio-modbus` context outright (each
//! `get` is a fresh socket, matching `client.py`'s `TcpClient`/
//! `UdpClient`). Serial handles share a `tokio-modbus` context with
//! every other handle open on the same tty, serialized behind a
//! `tokio::sync::Mutex` so only one transaction is ever in flight on
//! the wire at a time — matching `SerialClient`'s `threading.RLock`.
//! Owned contexts are wrapped in the same kind of mutex even though
//! they are never actually contended, so the call path is identical for
//! both cases.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_modbus::client::{tcp, Context as ModbusContext, Reader, Writer};
use tokio_modbus::{Request, Response, Slave};

use crate::error::TransportError;
use crate::pool::SerialEntry;

/// A UDP socket adapted to `AsyncRead`/`AsyncWrite` so it can be driven
/// through `tokio-modbus`'s TCP (MBAP) framing, matching the fact that
/// Modbus/UDP reuses the same MBAP header as Modbus/TCP — there is no
/// separate "UDP framing" to hand-roll.
struct UdpTransport {
    socket: UdpSocket,
}

impl AsyncRead for UdpTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

enum Inner {
    Owned(Mutex<ModbusContext>),
    Shared { entry: Arc<SerialEntry>, tty: String },
}

/// A leased Modbus connection. Holds its own timeout, overridable for
/// the scope of one call via [`crate::TimeoutGuard`].
pub struct ClientHandle {
    inner: Inner,
    unit: u8,
    timeout: Arc<Mutex<Duration>>,
}

impl ClientHandle {
    pub(crate) fn owned(ctx: ModbusContext, unit: u8, timeout: Duration) -> Self {
        Self {
            inner: Inner::Owned(Mutex::new(ctx)),
            unit,
            timeout: Arc::new(Mutex::new(timeout)),
        }
    }

    pub(crate) fn shared_serial(entry: Arc<SerialEntry>, tty: String, unit: u8) -> Self {
        let timeout = entry.timeout.clone();
        Self {
            inner: Inner::Shared { entry, tty },
            unit,
            timeout,
        }
    }

    pub fn timeout_slot(&self) -> Arc<Mutex<Duration>> {
        self.timeout.clone()
    }

    pub async fn read_holding_registers(
        &self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.call(|ctx, unit| async move {
            ctx.set_slave(Slave(unit));
            ctx.read_holding_registers(addr, count).await
        })
        .await
    }

    pub async fn read_input_registers(
        &self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.call(|ctx, unit| async move {
            ctx.set_slave(Slave(unit));
            ctx.read_input_registers(addr, count).await
        })
        .await
    }

    pub async fn write_single_register(&self, addr: u16, value: u16) -> Result<(), TransportError> {
        self.call(|ctx, unit| async move {
            ctx.set_slave(Slave(unit));
            ctx.write_single_register(addr, value).await
        })
        .await
    }

    pub async fn write_multiple_registers(
        &self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let values = values.to_vec();
        self.call(move |ctx, unit| async move {
            ctx.set_slave(Slave(unit));
            ctx.write_multiple_registers(addr, &values).await
        })
        .await
    }

    /// Function code 23: simultaneous read/write, used by the VregLink
    /// vendor control channel (`vreglink.py`).
    pub async fn read_write_multiple_registers(
        &self,
        read_addr: u16,
        read_count: u16,
        write_addr: u16,
        write_data: &[u16],
    ) -> Result<Vec<u16>, TransportError> {
        let write_data = write_data.to_vec();
        let resp = self
            .call(move |ctx, unit| async move {
                ctx.set_slave(Slave(unit));
                let req = Request::ReadWriteMultipleRegisters(
                    read_addr,
                    read_count,
                    write_addr,
                    write_data,
                );
                ctx.call(req).await
            })
            .await?;
        match resp {
            Response::ReadWriteMultipleRegisters(words) => Ok(words),
            other => Err(TransportError::Modbus(format!(
                "unexpected response {other:?}"
            ))),
        }
    }

    /// Runs one transaction against the underlying context, holding the
    /// per-tty lock for shared (serial) handles and the current timeout
    /// override for the whole call.
    async fn call<F, Fut, T>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(&mut ModbusContext, u8) -> Fut,
        Fut: std::future::Future<Output = io::Result<T>>,
    {
        let timeout = *self.timeout.lock().await;
        let ctx_mutex = match &self.inner {
            Inner::Owned(m) => m,
            Inner::Shared { entry, .. } => &entry.ctx,
        };
        let mut ctx = ctx_mutex.lock().await;
        tokio::time::timeout(timeout, f(&mut ctx, self.unit))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from)
    }

    pub(crate) async fn open_tcp(addr: SocketAddr, unit: u8) -> Result<Self, TransportError> {
        let ctx = tcp::connect(addr).await?;
        Ok(Self::owned(ctx, unit, Duration::from_secs(1)))
    }

    pub(crate) async fn open_udp(addr: SocketAddr, unit: u8) -> Result<Self, TransportError> {
        let local: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        let ctx = tcp::attach(UdpTransport { socket });
        Ok(Self::owned(ctx, unit, Duration::from_secs(1)))
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if let Inner::Shared { entry, tty } = &self.inner {
            entry.release(tty);
        }
    }
}
