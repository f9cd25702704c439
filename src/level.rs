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
//! Log event level & backend severity definitions.
//!
//! [`Level`] is the ordered severity scale on which events are produced & filtered; [`Severity`]
//! is the (coarser) scale the monitoring backend records.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use serde::{Deserialize, Serialize};

type StdResult<T, E> = std::result::Result<T, E>;

/// The severity of a log event, as seen by the front end.
///
/// Levels are totally ordered: `Verbose < Debug < Information < Warning < Error < Fatal`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Level {
    /// anything & everything
    Verbose = 0,
    /// internal system events that aren't necessarily observable from the outside
    Debug = 1,
    /// the lifeblood of operational intelligence: things happen
    Information = 2,
    /// service is degraded or endangered
    Warning = 3,
    /// functionality is unavailable, invariants are broken or data is lost
    Error = 4,
    /// if you have a pager, it goes off when one of these occurs
    Fatal = 5,
}

impl std::default::Default for Level {
    fn default() -> Self {
        Level::Verbose
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::Verbose => "Verbose",
                Level::Debug => "Debug",
                Level::Information => "Information",
                Level::Warning => "Warning",
                Level::Error => "Error",
                Level::Fatal => "Fatal",
            }
        )
    }
}

/// Raw discriminants are where a front end & this crate can disagree; anything we don't know is
/// a protocol mismatch & is reported as [`Error::UnmappedLevel`].
impl std::convert::TryFrom<u8> for Level {
    type Error = Error;
    fn try_from(x: u8) -> StdResult<Self, Error> {
        match x {
            0 => Ok(Level::Verbose),
            1 => Ok(Level::Debug),
            2 => Ok(Level::Information),
            3 => Ok(Level::Warning),
            4 => Ok(Level::Error),
            5 => Ok(Level::Fatal),
            _ => Err(Error::UnmappedLevel {
                value: x.to_string(),
                back: Backtrace::new(),
            }),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Level::Verbose),
            "debug" => Ok(Level::Debug),
            "information" | "info" => Ok(Level::Information),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(Error::UnmappedLevel {
                value: s.to_string(),
                back: Backtrace::new(),
            }),
        }
    }
}

impl std::convert::From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Verbose,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Information,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// The severities recorded by the monitoring backend. The discriminants are the backend's own
/// (they are powers of two so that they may be combined into masks).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    /// fatal error or application crash
    Critical = 1,
    /// recoverable error
    Error = 2,
    /// noncritical problem
    Warning = 4,
    /// informational message
    Information = 8,
    /// debugging trace
    Verbose = 16,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Severity::Critical => "Critical",
                Severity::Error => "Error",
                Severity::Warning => "Warning",
                Severity::Information => "Information",
                Severity::Verbose => "Verbose",
            }
        )
    }
}

impl std::convert::From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::Verbose | Level::Debug => Severity::Verbose,
            Level::Information => Severity::Information,
            Level::Warning => Severity::Warning,
            Level::Error => Severity::Error,
            Level::Fatal => Severity::Critical,
        }
    }
}
