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

//! Layer implementation.
//!
//! [`Layer`] is the adapter between [`tracing`] & a [`Sink`]: each [`Event`] is converted to a
//! [`LogEvent`](crate::event::LogEvent) (see [`crate::tracing`]) & emitted.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html

use crate::backend::Backend;
use crate::config::{SessionConfig, SinkConfiguration};
use crate::emitter::{Origin, Sink};
use crate::error::Result;
use crate::tracing::{to_log_event, PropertyVisitor, SpanProperties};

use tracing::Event;
use tracing_core::span::{Attributes, Id, Record};
use tracing_subscriber::layer::Context;

// When the tracing-log feature is enabled, use NormalizeEvent to recover the target & level of
// events that originated from the `log` crate. This follows the same pattern used by
// tracing-subscriber's fmt layer.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Targets at or beneath this are our own diagnostics
const OWN_TARGET: &str = "tracing_monitor";

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that forwards [`Event`]s to a
/// monitoring backend.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer<B: Backend> {
    sink: Sink<B>,
}

impl<B: Backend> Layer<B> {
    pub fn new(backend: B, config: SinkConfiguration) -> Layer<B> {
        Layer {
            sink: Sink::new(backend, config),
        }
    }
    /// Construct a [`Layer`] that owns the backend session (see [`Sink::with_session`])
    pub fn with_session(
        backend: B,
        session: &SessionConfig,
        config: SinkConfiguration,
    ) -> Result<Layer<B>> {
        Ok(Layer {
            sink: Sink::with_session(backend, session, config)?,
        })
    }
    pub fn sink(&self) -> &Sink<B> {
        &self.sink
    }
}

impl<B: Backend> std::convert::From<Sink<B>> for Layer<B> {
    fn from(sink: Sink<B>) -> Self {
        Layer { sink }
    }
}

/// This is the [`Layer`] implementation proper.
///
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
impl<S, B> tracing_subscriber::layer::Layer<S> for Layer<B>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    B: Backend + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut props = SpanProperties::default();
            attrs.record(&mut PropertyVisitor::for_span(&mut props));
            span.extensions_mut().insert(props);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            match extensions.get_mut::<SpanProperties>() {
                Some(props) => values.record(&mut PropertyVisitor::for_span(props)),
                None => {
                    let mut props = SpanProperties::default();
                    values.record(&mut PropertyVisitor::for_span(&mut props));
                    extensions.insert(props);
                }
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // Events bridged from the `log` crate carry their real target & level in fields;
        // normalized_metadata() returns None for native tracing events.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let origin = if is_own_target(meta.target()) {
            Origin::Internal
        } else {
            Origin::Client
        };

        let log_event = match ctx.event_scope(event) {
            Some(scope) => {
                let spans: Vec<_> = scope.from_root().collect();
                let extensions: Vec<_> = spans.iter().map(|span| span.extensions()).collect();
                to_log_event(
                    event,
                    meta.level(),
                    extensions.iter().filter_map(|ext| ext.get::<SpanProperties>()),
                )
            }
            None => to_log_event(event, meta.level(), std::iter::empty()),
        };

        // There's nowhere to report a failed write that doesn't lead straight back here.
        let _ = self.sink.emit_from(&log_event, origin);
    }
}

#[cfg(test)]
mod smoke {

    use super::*;

    use crate::backend::MemoryBackend;
    use crate::category::DEFAULT_CATEGORY;
    use crate::level::{Level, Severity};

    use std::sync::Arc;

    use tracing::{debug, error, info, info_span, trace, warn};
    use tracing_subscriber::{
        layer::SubscriberExt, // Needed to get `with()`
        registry::Registry,
    };

    fn install(
        config: SinkConfiguration,
    ) -> (Arc<MemoryBackend>, tracing::subscriber::DefaultGuard) {
        let backend = Arc::new(MemoryBackend::new());
        let subscriber = Registry::default().with(Layer::new(backend.clone(), config));
        (backend, tracing::subscriber::set_default(subscriber))
    }

    #[test]
    fn targets() {
        assert!(is_own_target("tracing_monitor"));
        assert!(is_own_target("tracing_monitor::backend"));
        assert!(!is_own_target("tracing_monitor_extras"));
        assert!(!is_own_target("shop"));
    }

    #[test]
    fn levels() {
        let (backend, _guard) = install(SinkConfiguration::default());
        trace!("Hello, 世界!");
        debug!("Hello, 世界!");
        info!("Hello, 世界!");
        warn!("Hello, 世界!");
        error!("Hello, 世界!");
        let records = backend.records();
        assert_eq!(
            records.iter().map(|r| r.severity).collect::<Vec<Severity>>(),
            vec![
                Severity::Verbose,
                Severity::Verbose,
                Severity::Information,
                Severity::Warning,
                Severity::Error
            ]
        );
        assert!(records.iter().all(|r| r.message == "Hello, 世界!"));
        assert!(records.iter().all(|r| r.category == DEFAULT_CATEGORY));
    }

    #[test]
    fn minimum_level() {
        let (backend, _guard) = install(
            SinkConfiguration::builder()
                .minimum_level(Level::Information)
                .build(),
        );
        debug!("dropped");
        info!("kept");
        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn messages_are_literal() {
        let (backend, _guard) = install(SinkConfiguration::default());
        info!(cart = 11, "Cart {{cart}} is {}", "{full}");
        let record = &backend.records()[0];
        assert_eq!(record.message, "Cart {cart} is {full}");
        assert_eq!(
            record.detail.as_deref(),
            Some("{\r\n\t\"cart\" : 11,\r\n}\r\n")
        );
    }

    #[test]
    fn span_properties() {
        let (backend, _guard) = install(
            SinkConfiguration::builder()
                .category_property("LogCategory")
                .build(),
        );
        let outer = info_span!("checkout", LogCategory = "Checkout.Debug", cart = 1);
        let _outer = outer.enter();
        let inner = info_span!("payment", attempt = tracing::field::Empty);
        inner.record("attempt", 2);
        let _inner = inner.enter();
        warn!(cart = 11, "declined");

        let record = &backend.records()[0];
        assert_eq!(record.category, "Checkout.Debug");
        assert_eq!(
            record.detail.as_deref(),
            Some(
                "{\r\n\t\"LogCategory\" : \"Checkout.Debug\",\r\n\t\"cart\" : 11,\r\n\t\"attempt\" : 2,\r\n}\r\n"
            )
        );
    }

    #[test]
    fn errors() {
        let (backend, _guard) = install(SinkConfiguration::default());
        let err = std::fmt::Error;
        error!(error = &err as &(dyn std::error::Error + 'static), "formatting failed");
        let record = &backend.records()[0];
        assert_eq!(
            record.exception.as_ref().map(|e| e.message.as_str()),
            Some("an error occurred when formatting an argument")
        );
    }

    #[test]
    fn own_events_are_trusted() {
        let (backend, _guard) = install(SinkConfiguration::default());
        tracing::info!(target: "tracing_monitor::backend", "monitoring session started");
        let record = &backend.records()[0];
        // Raised from this crate (this very test), so the frame past the dispatch is the source
        // even though it's ours.
        let site = record.call_site.as_ref().unwrap();
        assert_eq!(site.method_name, "own_events_are_trusted");
        assert!(site.class_name.as_deref().unwrap().ends_with("layer::smoke"));
        assert!(site.file_name.as_deref().unwrap().ends_with("layer.rs"));
        assert!(site.line_number.is_some());
    }

    #[test]
    fn client_events_skip_our_frames() {
        let (backend, _guard) = install(SinkConfiguration::default());
        info!("from a test of ours");
        // every frame from here to the test harness is ours or the runtime's
        let site = backend.records()[0].call_site.clone();
        assert_ne!(
            site.map(|s| s.method_name),
            Some("client_events_skip_our_frames".to_string())
        );
    }
}
