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

//! The log events this crate forwards.
//!
//! A [`LogEvent`] is what the front end hands the sink: a level, a message template, an ordered
//! list of structured [`Property`] values & (optionally) an [`ExceptionInfo`]. The sink only
//! ever reads a [`LogEvent`].

use crate::callsite::{capture, StackFrameInfo};

use backtrace::Backtrace;
use chrono::prelude::*;
use serde::Serialize;
use serde_json::Value;

/// One named, structured value attached to a [`LogEvent`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new<N: Into<String>, V: Into<Value>>(name: N, value: V) -> Property {
        Property {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An error attached to a [`LogEvent`], along with (optionally) the stack on which it was raised.
///
/// Rust errors don't carry a stack trace of their own, so the frames here are whatever was
/// captured when the error was wrapped ([`ExceptionInfo::capture`]) or whatever [`Backtrace`]
/// the error was carrying ([`ExceptionInfo::with_backtrace`]).
#[derive(Clone, Debug, Serialize)]
pub struct ExceptionInfo {
    /// Type name of the error, when known
    pub type_name: Option<String>,
    pub message: String,
    /// The error's `source()`, if any
    pub inner: Option<Box<ExceptionInfo>>,
    /// Innermost (raise site) first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<StackFrameInfo>>,
}

impl ExceptionInfo {
    /// Describe `err` (and its chain of sources); no stack is recorded.
    pub fn new<E: std::error::Error + 'static>(err: &E) -> ExceptionInfo {
        let mut info = ExceptionInfo::from_dyn(err);
        info.type_name = Some(std::any::type_name::<E>().to_string());
        info
    }
    /// Describe `err` when all we have is a trait object (the type name is lost).
    pub fn from_dyn(err: &(dyn std::error::Error + 'static)) -> ExceptionInfo {
        ExceptionInfo {
            type_name: None,
            message: err.to_string(),
            inner: err.source().map(|src| Box::new(ExceptionInfo::from_dyn(src))),
            frames: None,
        }
    }
    /// Describe `err` & record the current stack as its raise site.
    pub fn capture<E: std::error::Error + 'static>(err: &E) -> ExceptionInfo {
        ExceptionInfo::new(err).with_backtrace(&Backtrace::new())
    }
    /// Record the frames of `back` as this error's raise site.
    pub fn with_backtrace(mut self, back: &Backtrace) -> ExceptionInfo {
        self.frames = Some(capture::frames_from_backtrace(back));
        self
    }
}

impl std::convert::From<&crate::error::Error> for ExceptionInfo {
    fn from(err: &crate::error::Error) -> Self {
        let info = ExceptionInfo::new(err);
        match err.backtrace() {
            Some(back) => info.with_backtrace(back),
            None => info,
        }
    }
}

/// A structured log event.
#[derive(Clone, Debug)]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    level: crate::level::Level,
    template: String,
    properties: Vec<Property>,
    exception: Option<ExceptionInfo>,
}

impl LogEvent {
    /// A new event, stamped now, with no properties
    pub fn new<T: Into<String>>(level: crate::level::Level, template: T) -> LogEvent {
        LogEvent {
            timestamp: Utc::now(),
            level,
            template: template.into(),
            properties: Vec::new(),
            exception: None,
        }
    }
    /// Add a property; a property of the same name is replaced in place, keeping its position.
    pub fn with_property<N: Into<String>, V: Into<Value>>(mut self, name: N, value: V) -> Self {
        self.set_property(Property::new(name, value));
        self
    }
    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
    pub(crate) fn set_property(&mut self, prop: Property) {
        match self.properties.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => existing.value = prop.value,
            None => self.properties.push(prop),
        }
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn level(&self) -> crate::level::Level {
        self.level
    }
    pub fn template(&self) -> &str {
        &self.template
    }
    /// Properties in the order in which they were attached
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }
}

/// Escape `text` so that it renders verbatim as a message template.
pub fn literal_template(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::level::Level;

    #[derive(Debug)]
    struct Outer {
        inner: std::io::Error,
    }
    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "The outermost exception")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.inner)
        }
    }

    #[test]
    fn properties_keep_their_order() {
        let event = LogEvent::new(Level::Information, "Hello {name}")
            .with_property("name", "world")
            .with_property("count", 3)
            .with_property("name", "again");
        let names: Vec<&str> = event.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "count"]);
        assert_eq!(event.property("name"), Some(&Value::from("again")));
        assert_eq!(event.property("missing"), None);
    }

    #[test]
    fn exception_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "The innermost exception"),
        };
        let info = ExceptionInfo::new(&err);
        assert_eq!(info.message, "The outermost exception");
        assert!(info.type_name.unwrap().ends_with("Outer"));
        let inner = info.inner.unwrap();
        assert_eq!(inner.message, "The innermost exception");
        assert!(inner.type_name.is_none());
        assert!(inner.inner.is_none());
        assert!(info.frames.is_none());
    }

    #[test]
    fn captured_exception_has_frames() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let info = ExceptionInfo::capture(&err);
        assert!(!info.frames.unwrap().is_empty());
    }

    #[test]
    fn literal_templates() {
        assert_eq!(literal_template("a {b} c"), "a {{b}} c");
        assert_eq!(literal_template("plain"), "plain");
    }
}
