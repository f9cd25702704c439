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

//! Choosing a category for each record.
//!
//! The backend files every record under a category. By default that's a fixed label, but the
//! sink can be configured to take it from a named event property, so that (say) a span carrying
//! `LogCategory = "Checkout.Payments"` files everything logged beneath it accordingly.

use crate::event::LogEvent;

use serde_json::Value;

/// The category used when none is configured, or the configured property is missing
pub const DEFAULT_CATEGORY: &str = "tracing";

/// Render `value` as plain text: strings yield their contents (no quotes, no escapes), anything
/// else its JSON representation.
pub fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves the category of a [`LogEvent`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryResolver {
    property: Option<String>,
}

impl CategoryResolver {
    /// A blank property name is the same as none at all.
    pub fn new(property: Option<&str>) -> CategoryResolver {
        CategoryResolver {
            property: property
                .filter(|name| !name.trim().is_empty())
                .map(|name| name.to_string()),
        }
    }
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }
    pub fn resolve(&self, event: &LogEvent) -> String {
        self.property
            .as_deref()
            .and_then(|name| event.property(name))
            .map(literal_text)
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::level::Level;

    use serde_json::json;

    fn event() -> LogEvent {
        LogEvent::new(Level::Information, "Cart {CartId} checked out").with_property("CartId", 11)
    }

    #[test]
    fn unconfigured() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve(&event()), DEFAULT_CATEGORY);
        assert_eq!(
            resolver.resolve(&event().with_property("LogCategory", "Checkout.Debug")),
            DEFAULT_CATEGORY
        );
    }

    #[test]
    fn from_property() {
        let resolver = CategoryResolver::new(Some("LogCategory"));
        assert_eq!(
            resolver.resolve(&event().with_property("LogCategory", "Checkout.Debug")),
            "Checkout.Debug"
        );
        // present-but-blank is still present
        assert_eq!(
            resolver.resolve(&event().with_property("LogCategory", "  ")),
            "  "
        );
        assert_eq!(
            resolver.resolve(&event().with_property("LogCategory", json!(42))),
            "42"
        );
    }

    #[test]
    fn missing_property() {
        let resolver = CategoryResolver::new(Some("LogCategory"));
        assert_eq!(resolver.resolve(&event()), DEFAULT_CATEGORY);
    }

    #[test]
    fn blank_property_name() {
        assert_eq!(CategoryResolver::new(Some(" \t")).property(), None);
        assert_eq!(CategoryResolver::new(Some("")).property(), None);
        assert_eq!(CategoryResolver::new(None).property(), None);
    }

    #[test]
    fn literals() {
        assert_eq!(literal_text(&json!("a \"quoted\" word")), "a \"quoted\" word");
        assert_eq!(literal_text(&json!(true)), "true");
        assert_eq!(literal_text(&json!(null)), "null");
        assert_eq!(literal_text(&json!([1, 2])), "[1,2]");
    }
}
