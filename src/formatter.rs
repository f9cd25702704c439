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

//! Record formatting primitives.
//!
//! This module defines the [`RecordFormatter`] trait & the [`JsonLines`] implementation.

use crate::backend::EnrichedRecord;
use crate::config::SessionConfig;
use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::prelude::*;
use serde::Serialize;

use std::ops::Deref;

type StdResult<T, E> = std::result::Result<T, E>;

/// The things a backend sends to its agent
#[derive(Clone, Copy, Debug)]
pub enum Payload<'a> {
    SessionStarted(&'a SessionConfig),
    Record(&'a EnrichedRecord),
    SessionEnded,
}

/// Operations all formatters must support
/// ======================================
///
/// # Introduction
///
/// Getting a record to the monitoring agent occurs in three parts:
///
/// 1. building an [`EnrichedRecord`] from the event (the [`Sink`]'s job)
///
/// 2. wrapping it in an envelope the agent understands
///
/// 3. transporting that envelope to the agent
///
/// [`RecordFormatter`] implements step 2 in this process.
///
/// [`Sink`]: crate::emitter::Sink
///
/// # Design
///
/// The associated type `Output` is there so that the only thing that can be handed to a
/// [`Transport`] is something a [`RecordFormatter`] produced; the constraint that it
/// dereference to a slice of `u8` is what lets the [`Transport`] put it on the wire.
///
/// [`Transport`]: crate::transport::Transport
pub trait RecordFormatter {
    type Error: std::error::Error;
    type Output: Deref<Target = [u8]>;
    fn format(&self, payload: Payload<'_>) -> StdResult<Self::Output, Self::Error>;
}

/// A host name with the additional constraint that it be fewer than 256 bytes of ASCII.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hostname(String);

impl Hostname {
    pub fn new(bytes: Vec<u8>) -> Result<Hostname> {
        if bytes.is_ascii() && bytes.len() < 256 {
            // ASCII is UTF-8
            Ok(Hostname(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Err(Error::BadHostname {
                name: bytes,
                back: Backtrace::new(),
            })
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::default::Default for Hostname {
    /// Figure-out a host name: first try [gethostname()], then look for a local IP address, & in
    /// the last resort use "-".
    ///
    /// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
    fn default() -> Self {
        hostname::get()
            .map_err(|err| Error::NoHostname {
                source: Box::new(err),
                back: Backtrace::new(),
            })
            .and_then(|name| Hostname::new(name.to_string_lossy().into_owned().into_bytes()))
            .or_else(|_| {
                local_ip_address::local_ip()
                    .map(|ip| Hostname(ip.to_string()))
                    .map_err(|err| Error::NoHostname {
                        source: Box::new(err),
                        back: Backtrace::new(),
                    })
            })
            .unwrap_or_else(|_| Hostname("-".to_string()))
    }
}

impl std::convert::TryFrom<String> for Hostname {
    type Error = Error;
    fn try_from(x: String) -> StdResult<Self, Self::Error> {
        Hostname::new(x.into_bytes())
    }
}

/// The name under which this application reports
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppName(String);

impl AppName {
    pub fn new<S: Into<String>>(name: S) -> AppName {
        AppName(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::default::Default for AppName {
    /// The file name of the current executable; this cannot fail, falling back to "-".
    fn default() -> Self {
        std::env::current_exe()
            .map_err(|err| Error::NoExecutable {
                source: Box::new(err),
                back: Backtrace::new(),
            })
            .ok()
            .and_then(|pbuf| {
                pbuf.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .map(AppName)
            .unwrap_or_else(|| AppName("-".to_string()))
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    kind: &'static str,
    host: &'a str,
    app: &'a str,
    pid: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a SessionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a EnrichedRecord>,
}

/// Formats each [`Payload`] as one line of JSON.
///
/// ```text
/// {"kind":"record","host":"bree","app":"shop","pid":4242,"timestamp":"2022-06-23T16:10:55.123+00:00","record":{...}}
/// ```
///
/// Stream transports delimit envelopes with a newline; datagram transports send one per packet.
pub struct JsonLines {
    hostname: Hostname,
    appname: AppName,
    pid: u32,
}

impl std::default::Default for JsonLines {
    fn default() -> Self {
        JsonLines {
            hostname: Hostname::default(),
            appname: AppName::default(),
            pid: std::process::id(),
        }
    }
}

pub struct JsonLinesBuilder {
    imp: JsonLines,
}

impl JsonLinesBuilder {
    pub fn hostname(mut self, hostname: Hostname) -> Self {
        self.imp.hostname = hostname;
        self
    }
    pub fn hostname_as_string(mut self, hostname: String) -> Result<Self> {
        self.imp.hostname = Hostname::try_from(hostname)?;
        Ok(self)
    }
    pub fn appname(mut self, appname: AppName) -> Self {
        self.imp.appname = appname;
        self
    }
    pub fn pid(mut self, pid: u32) -> Self {
        self.imp.pid = pid;
        self
    }
    pub fn build(self) -> JsonLines {
        self.imp
    }
}

impl JsonLines {
    pub fn builder() -> JsonLinesBuilder {
        JsonLinesBuilder {
            imp: JsonLines::default(),
        }
    }
}

impl RecordFormatter for JsonLines {
    type Error = Error;
    type Output = Bytes;
    fn format(&self, payload: Payload<'_>) -> Result<Bytes> {
        let (kind, session, record, timestamp) = match payload {
            Payload::SessionStarted(config) => ("session-start", Some(config), None, Utc::now()),
            Payload::Record(record) => ("record", None, Some(record), record.timestamp),
            Payload::SessionEnded => ("session-end", None, None, Utc::now()),
        };
        let envelope = Envelope {
            kind,
            host: self.hostname.as_str(),
            app: self.appname.as_str(),
            pid: self.pid,
            timestamp: timestamp.to_rfc3339(),
            session,
            record,
        };
        let mut writer = BytesMut::with_capacity(512).writer();
        serde_json::to_writer(&mut writer, &envelope).map_err(|err| Error::Format {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(writer.into_inner().freeze())
    }
}
