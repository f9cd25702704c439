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

//! Primitives for mapping [`tracing`] entities to [`LogEvent`]s.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! Each field of an [`Event`] becomes a [`Property`] of the [`LogEvent`], in field order, with
//! one exception: the "message" field (which the `info!()`, `event!()` & similar macros
//! pre-format for us) becomes the message itself. Since a `tracing` message has already been
//! formatted, it's escaped so that the template renderer reproduces it as-is.
//!
//! Fields of the spans in which the event occurred are properties, too; they're stashed in the
//! span's extensions when the span is created (or recorded) & picked-up root-first when an event
//! occurs inside them.
//!
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html

use crate::event::{literal_template, ExceptionInfo, LogEvent, Property};
use crate::level::Level;

use serde_json::Value;
use tracing::field::{Field, Visit};

/// The fields of a span, kept in its extensions
#[derive(Clone, Debug, Default)]
pub(crate) struct SpanProperties(pub(crate) Vec<Property>);

impl SpanProperties {
    fn set(&mut self, prop: Property) {
        match self.0.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => existing.value = prop.value,
            None => self.0.push(prop),
        }
    }
}

/// Collects the fields of an [`Event`] or span.
///
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub(crate) struct PropertyVisitor<'a> {
    properties: &'a mut SpanProperties,
    /// Whether "message" is the message (events) or just another property (spans)
    take_message: bool,
    message: Option<String>,
    exception: Option<ExceptionInfo>,
}

impl<'a> PropertyVisitor<'a> {
    pub(crate) fn for_span(properties: &'a mut SpanProperties) -> PropertyVisitor<'a> {
        PropertyVisitor {
            properties,
            take_message: false,
            message: None,
            exception: None,
        }
    }
    pub(crate) fn for_event(properties: &'a mut SpanProperties) -> PropertyVisitor<'a> {
        PropertyVisitor {
            take_message: true,
            ..PropertyVisitor::for_span(properties)
        }
    }
    fn put(&mut self, field: &Field, value: Value) {
        // fields added by tracing-log when bridging from the `log` crate
        if field.name().starts_with("log.") {
            return;
        }
        if self.take_message && field.name() == "message" {
            self.message = Some(crate::category::literal_text(&value));
        } else {
            self.properties.set(Property::new(field.name(), value));
        }
    }
}

impl<'a> Visit for PropertyVisitor<'a> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }
    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if self.exception.is_none() {
            self.exception = Some(ExceptionInfo::from_dyn(value));
        }
        self.put(field, Value::from(value.to_string()));
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The message field is a pre-formatted `std::fmt::Arguments`, which prints to a debug
        // format without enclosing double-quotes.
        self.put(field, Value::from(format!("{:?}", value)));
    }
}

/// Build a [`LogEvent`] from `event`; `scope` holds the properties of the spans in which it
/// occurred, root first.
pub(crate) fn to_log_event<'s, I>(
    event: &tracing::Event<'_>,
    level: &tracing::Level,
    scope: I,
) -> LogEvent
where
    I: IntoIterator<Item = &'s SpanProperties>,
{
    let mut properties = SpanProperties::default();
    for span in scope {
        for prop in &span.0 {
            properties.set(prop.clone());
        }
    }
    let mut visitor = PropertyVisitor::for_event(&mut properties);
    event.record(&mut visitor);
    let message = visitor.message.take().unwrap_or_default();
    let exception = visitor.exception.take();

    let mut log_event = LogEvent::new(Level::from(level), literal_template(&message));
    for prop in properties.0 {
        log_event.set_property(prop);
    }
    match exception {
        Some(exception) => log_event.with_exception(exception),
        None => log_event,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use tracing::Callsite;

    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }
    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }
    impl TestCallsite {
        pub const fn new(metadata: &'static tracing::Metadata<'static>) -> TestCallsite {
            TestCallsite { metadata }
        }
    }

    #[derive(Debug)]
    struct OutOfStock;
    impl std::fmt::Display for OutOfStock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "out of stock")
        }
    }
    impl std::error::Error for OutOfStock {}

    static CALLSITE: TestCallsite = {
        static METADATA: tracing::Metadata = tracing::Metadata::new(
            "test event metadata",
            "shop::checkout",
            tracing::Level::WARN,
            Some(file!()),
            Some(line!()),
            Some(module_path!()),
            tracing::field::FieldSet::new(
                &["message", "cart", "total", "error", "log.target"],
                tracing_core::callsite::Identifier(&CALLSITE),
            ),
            tracing_core::metadata::Kind::EVENT,
        );
        TestCallsite::new(&METADATA)
    };

    #[test]
    fn fields() {
        let fields = CALLSITE.metadata().fields();
        let message = fields.field("message").unwrap();
        let cart = fields.field("cart").unwrap();
        let total = fields.field("total").unwrap();
        let error = fields.field("error").unwrap();
        let log_target = fields.field("log.target").unwrap();
        let err = OutOfStock;
        let err: &(dyn std::error::Error + 'static) = &err;
        let values: [(&Field, Option<&dyn tracing::Value>); 5] = [
            (&message, Some(&"Checkout {failed} for bob" as &dyn tracing::Value)),
            (&cart, Some(&11u64 as &dyn tracing::Value)),
            (&total, Some(&12.5f64 as &dyn tracing::Value)),
            (&error, Some(&err as &dyn tracing::Value)),
            (&log_target, Some(&"shop" as &dyn tracing::Value)),
        ];
        let value_set = fields.value_set(&values);
        let event = tracing::Event::new(CALLSITE.metadata(), &value_set);

        let span = SpanProperties(vec![
            Property::new("cart", 1),
            Property::new("LogCategory", "Checkout"),
        ]);
        let log_event = to_log_event(&event, &tracing::Level::WARN, [&span]);

        assert_eq!(log_event.level(), Level::Warning);
        assert_eq!(log_event.template(), "Checkout {{failed}} for bob");
        let names: Vec<&str> = log_event
            .properties()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["cart", "LogCategory", "total", "error"]);
        assert_eq!(log_event.property("cart"), Some(&Value::from(11u64)));
        assert_eq!(log_event.property("total"), Some(&Value::from(12.5)));
        assert_eq!(
            log_event.property("error"),
            Some(&Value::from("out of stock"))
        );
        let exception = log_event.exception().unwrap();
        assert_eq!(exception.message, "out of stock");
        assert!(exception.frames.is_none());
    }

    #[test]
    fn span_fields() {
        let mut props = SpanProperties::default();
        {
            let mut visitor = PropertyVisitor::for_span(&mut props);
            let fields = CALLSITE.metadata().fields();
            visitor.record_str(&fields.field("message").unwrap(), "a span message");
            visitor.record_u64(&fields.field("cart").unwrap(), 3);
            visitor.record_u64(&fields.field("cart").unwrap(), 4);
        }
        assert_eq!(
            props.0,
            vec![
                Property::new("message", "a span message"),
                Property::new("cart", 4u64)
            ]
        );
    }
}
