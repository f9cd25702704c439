// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-monitor.
//
// tracing-monitor is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! The record transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well
//! as UDP, TCP & Unix socket implementations.
//!
//! # Examples
//!
//! To send records over UDP to an agent listening on port 4520 on localhost:
//!
//! ```rust
//! use tracing_monitor::formatter::JsonLines;
//! use tracing_monitor::transport::UdpTransport;
//! let transpo = UdpTransport::<JsonLines>::local().unwrap();
//! ```
//!
//! On a non-standard port on another host:
//!
//! ```no_run
//! use tracing_monitor::formatter::JsonLines;
//! use tracing_monitor::transport::UdpTransport;
//! let transpo = UdpTransport::<JsonLines>::new("some-host.domain.io:5520").unwrap();
//! ```

use crate::error::{Error, Result};
use crate::formatter::RecordFormatter;

use backtrace::Backtrace;

use std::{marker::PhantomData, net::TcpStream};

#[cfg(target_os = "linux")]
use std::{os::unix::net::UnixDatagram, path::Path};

/// The port on which agents conventionally listen
pub const DEFAULT_PORT: u16 = 4520;

fn transport_error(err: std::io::Error) -> Error {
    Error::Transport {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

/// Operations all transport layers must support.
///
/// Implementations are generic in the [`RecordFormatter`] whose output they carry, so that only
/// formatted records can be sent.
pub trait Transport<F: RecordFormatter> {
    /// Send one formatted payload on this transport mechanism.
    fn send(&self, buf: F::Output) -> Result<usize>;
}

/// Sending records via UDP datagrams, one per datagram.
pub struct UdpTransport<F> {
    socket: std::net::UdpSocket,
    phantom: PhantomData<fn(F)>,
}

impl<F> UdpTransport<F> {
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: std::net::ToSocketAddrs>(addr: A) -> Result<UdpTransport<F>> {
        // Bind to any available port on localhost...
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").map_err(transport_error)?;
        // and connect to the agent at `addr`:
        socket.connect(addr).map_err(transport_error)?;
        Ok(UdpTransport {
            socket,
            phantom: PhantomData,
        })
    }
    /// Construct a [`Transport`] implementation via UDP at localhost:4520
    pub fn local() -> Result<UdpTransport<F>> {
        UdpTransport::new(("localhost", DEFAULT_PORT))
    }
}

impl<F: RecordFormatter> Transport<F> for UdpTransport<F> {
    fn send(&self, buf: F::Output) -> Result<usize> {
        self.socket.send(&buf).map_err(transport_error)
    }
}

/// Sending records via a TCP stream, newline-delimited.
pub struct TcpTransport<F> {
    socket: TcpStream,
    phantom: PhantomData<fn(F)>,
}

impl<F> TcpTransport<F> {
    /// Construct a [`Transport`] implementation via TCP at `addr`.
    pub fn new<A: std::net::ToSocketAddrs>(addr: A) -> Result<TcpTransport<F>> {
        Ok(TcpTransport {
            socket: TcpStream::connect(addr).map_err(transport_error)?,
            phantom: PhantomData,
        })
    }
    /// Construct a [`Transport`] implementation via TCP at localhost:4520
    pub fn try_default() -> Result<TcpTransport<F>> {
        TcpTransport::new(("localhost", DEFAULT_PORT))
    }
}

impl<F: RecordFormatter> Transport<F> for TcpTransport<F> {
    fn send(&self, buf: F::Output) -> Result<usize> {
        use std::io::Write;
        // `Write` is implemented for `&TcpStream` as well as `TcpStream`, which lets us write
        // through a shared reference.
        let mut writer: &TcpStream = &self.socket;
        writer.write_all(&buf).map_err(transport_error)?;
        writer.write_all(b"\n").map_err(transport_error)?;
        writer.flush().map_err(transport_error)?;
        Ok(buf.len())
    }
}

/// Sending records via Unix socket (datagram)
#[cfg(target_os = "linux")]
pub struct UnixSocket<F> {
    socket: UnixDatagram,
    phantom: PhantomData<fn(F)>,
}

#[cfg(target_os = "linux")]
impl<F> UnixSocket<F> {
    /// Construct a [`Transport`] implementation via Unix datagram sockets at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<UnixSocket<F>> {
        let sock = UnixDatagram::unbound().map_err(transport_error)?;
        sock.connect(path).map_err(transport_error)?;
        Ok(UnixSocket {
            socket: sock,
            phantom: PhantomData,
        })
    }
}

#[cfg(target_os = "linux")]
impl<F: RecordFormatter> Transport<F> for UnixSocket<F> {
    fn send(&self, buf: F::Output) -> Result<usize> {
        self.socket.send(&buf).map_err(transport_error)
    }
}
