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
//! [tracing-monitor](crate) errors

use backtrace::Backtrace;

/// [tracing-monitor](crate) error type
///
/// [tracing-monitor](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to repond.
///
/// Note that attributing an event to a call site never produces an [`Error`]; the only failure
/// the event pipeline itself reports is [`Error::UnmappedLevel`], which means the caller handed
/// us a severity we don't know how to translate.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A raw severity discriminant or name that maps to no [`Level`](crate::level::Level)
    UnmappedLevel { value: String, back: Backtrace },
    /// The provided or discovered hostname can't be used in a record envelope
    BadHostname { name: Vec<u8>, back: Backtrace },
    /// Failed to fetch hostname (via libc)
    NoHostname {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Failed to fetch the current executable (via std::env)
    NoExecutable {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Failed to encode a record for the wire
    Format {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The backend's write queue has been shut down
    QueueClosed { back: Backtrace },
    /// A session was started while one was already in progress, or ended when none was
    Session { reason: String, back: Backtrace },
}

impl Error {
    /// The [`Backtrace`] captured when this error was created, if any
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Error::UnmappedLevel { back, .. }
            | Error::BadHostname { back, .. }
            | Error::NoHostname { back, .. }
            | Error::NoExecutable { back, .. }
            | Error::Format { back, .. }
            | Error::Transport { back, .. }
            | Error::QueueClosed { back }
            | Error::Session { back, .. } => Some(back),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::UnmappedLevel { value, .. } => {
                write!(f, "'{}' does not name a known log event level", value)
            }
            Error::BadHostname { name, .. } => write!(
                f,
                "The hostname '{}' is not usable in a record envelope",
                String::from_utf8_lossy(name)
            ),
            Error::NoHostname { source, .. } => write!(f, "Couldn't get the hostname: {}", source),
            Error::NoExecutable { source, .. } => {
                write!(f, "Couldn't get the current executable: {}", source)
            }
            Error::Format { source, .. } => write!(f, "While formatting a record, got {}", source),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            Error::QueueClosed { .. } => write!(f, "The backend write queue has been closed"),
            Error::Session { reason, .. } => write!(f, "Monitoring session error: {}", reason),
            _ => write!(f, "Other tracing-monitor error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.backtrace() {
            Some(back) => write!(f, "{}\n{:?}", self, back),
            None => write!(f, "tracing-monitor error: {}", self),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoHostname { source, .. }
            | Error::NoExecutable { source, .. }
            | Error::Format { source, .. }
            | Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnmappedLevel {
            value: "17".to_string(),
            back: Backtrace::new(),
        };
        assert_eq!(
            format!("{}", err),
            "'17' does not name a known log event level"
        );
        assert!(err.backtrace().is_some());
        assert!(std::error::Error::source(&err).is_none());

        let err = Error::Transport {
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
            back: Backtrace::new(),
        };
        assert_eq!(format!("{}", err), "Transport error: refused");
        assert!(std::error::Error::source(&err).is_some());
        // Debug output carries the backtrace after the message
        assert!(format!("{:?}", err).starts_with("Transport error: refused\n"));
    }
}
