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

//! Rendering event properties into a record's detail.
//!
//! The detail is a brace-delimited block with one `"name" : value,` line per property, in the
//! event's own property order:
//!
//! ```text
//! {
//! 	"CartId" : 11,
//! 	"Customer" : "bob",
//! }
//! ```
//!
//! Lines end in CRLF & are indented with a tab. Every entry, including the last, carries a
//! trailing comma. How values (and names) are quoted is up to a [`ValueFormatter`].

use crate::event::LogEvent;

use serde_json::Value;

/// Renders single values as text.
///
/// Implementations must accept any [`Value`]; there is no way to report failure.
pub trait ValueFormatter {
    /// Append the canonical textual representation of `value` to `out`
    fn format_value(&self, value: &Value, out: &mut String);
    /// Append `text`, quoted & escaped, to `out`
    fn write_quoted(&self, text: &str, out: &mut String);
}

/// Formats values as compact JSON
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonValueFormatter;

impl ValueFormatter for JsonValueFormatter {
    fn format_value(&self, value: &Value, out: &mut String) {
        out.push_str(&value.to_string());
    }
    fn write_quoted(&self, text: &str, out: &mut String) {
        // A JSON string is its own quoted form
        out.push_str(&Value::from(text).to_string());
    }
}

/// Resolves the (optional) detail of a [`LogEvent`].
#[derive(Clone, Debug, Default)]
pub struct DetailRenderer<V = JsonValueFormatter> {
    enabled: bool,
    formatter: V,
}

impl DetailRenderer<JsonValueFormatter> {
    pub fn new(enabled: bool) -> DetailRenderer<JsonValueFormatter> {
        DetailRenderer::with_formatter(enabled, JsonValueFormatter)
    }
}

impl<V: ValueFormatter> DetailRenderer<V> {
    pub fn with_formatter(enabled: bool, formatter: V) -> DetailRenderer<V> {
        DetailRenderer { enabled, formatter }
    }
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    /// `None` if rendering is disabled or the event has no properties
    pub fn resolve(&self, event: &LogEvent) -> Option<String> {
        if !self.enabled || event.properties().is_empty() {
            return None;
        }
        let mut out = String::from("{\r\n");
        for prop in event.properties() {
            out.push('\t');
            self.formatter.write_quoted(&escape_name(&prop.name), &mut out);
            out.push_str(" : ");
            self.formatter.format_value(&prop.value, &mut out);
            out.push_str(",\r\n");
        }
        out.push_str("}\r\n");
        Some(out)
    }
}

/// A leading '@' marks destructuring in a template, so it's doubled in property names.
fn escape_name(name: &str) -> std::borrow::Cow<'_, str> {
    if name.starts_with('@') {
        format!("@{}", name).into()
    } else {
        name.into()
    }
}
