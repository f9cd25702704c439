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

//! The sink: turning [`LogEvent`]s into backend writes.
//!
//! [`Sink::emit`] runs each event through a fixed pipeline:
//!
//! 1. the [`EventFilter`]; events below the configured level stop here, before any other work
//!
//! 2. severity, category ([`CategoryResolver`]) & detail ([`DetailRenderer`])
//!
//! 3. attribution ([`CallSiteResolver`]), if enabled
//!
//! 4. message rendering (a [`MessageRenderer`])
//!
//! 5. exactly one [`WriteMode::Queued`] write to the [`Backend`]
//!
//! A [`Sink`] holds nothing but its configuration & the components derived from it, so it may be
//! shared freely between threads.

use crate::backend::{Backend, EnrichedRecord, WriteMode, SOURCE_SYSTEM};
use crate::callsite::{
    capture, resolve::MAX_FRAMES, CallSite, CallSiteResolver, FrameClass, FrameFault,
    StackFrameInfo,
};
use crate::category::CategoryResolver;
use crate::config::{SessionConfig, SinkConfiguration};
use crate::detail::DetailRenderer;
use crate::error::Result;
use crate::event::LogEvent;
use crate::filter::EventFilter;
use crate::level::Severity;
use crate::render::{MessageRenderer, TemplateRenderer};

use std::cell::Cell;

type Frame = std::result::Result<StackFrameInfo, FrameFault>;

/// Who raised the event being emitted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Application code; the frames nearest the capture point are plumbing
    Client,
    /// This crate; the first frame past the front end's dispatch is the source
    Internal,
}

thread_local! {
    static EMITTING: Cell<bool> = Cell::new(false);
}

/// Marks this thread as inside `emit` for as long as it lives
struct EmitGuard;

impl EmitGuard {
    fn enter() -> Option<EmitGuard> {
        EMITTING
            .try_with(|emitting| !emitting.replace(true))
            .unwrap_or(false)
            .then_some(EmitGuard)
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        let _ = EMITTING.try_with(|emitting| emitting.set(false));
    }
}

/// Offset of the first frame past the leading run of our own & front-end frames
fn dispatch_depth(resolver: &CallSiteResolver, frames: &[Frame]) -> usize {
    let classify = |frame: &Frame| {
        frame
            .as_ref()
            .ok()
            .map(|f| resolver.classifier().classify(f))
    };
    let ours = frames
        .iter()
        .take_while(|f| classify(f) == Some(FrameClass::AdapterInternal))
        .count();
    let dispatch = frames[ours..]
        .iter()
        .take_while(|f| classify(f) == Some(FrameClass::System))
        .count();
    ours + dispatch
}

/// Forwards [`LogEvent`]s to a [`Backend`].
pub struct Sink<B: Backend> {
    backend: B,
    config: SinkConfiguration,
    filter: EventFilter,
    categories: CategoryResolver,
    details: DetailRenderer,
    resolver: CallSiteResolver,
    renderer: Box<dyn MessageRenderer>,
}

impl<B: Backend> Sink<B> {
    /// A sink writing to `backend`, whose session is managed elsewhere (unless
    /// `config.end_session_on_close` says otherwise)
    pub fn new(backend: B, config: SinkConfiguration) -> Sink<B> {
        Sink {
            filter: EventFilter::new(config.minimum_level),
            categories: CategoryResolver::new(config.category_property.as_deref()),
            details: DetailRenderer::new(config.render_properties),
            resolver: CallSiteResolver::new(config.frame_rules.clone()),
            renderer: Box::new(TemplateRenderer),
            backend,
            config,
        }
    }
    /// Start a session on `backend` & take ownership of it: the session ends when the sink is
    /// dropped.
    pub fn with_session(
        backend: B,
        session: &SessionConfig,
        mut config: SinkConfiguration,
    ) -> Result<Sink<B>> {
        backend.start_session(session)?;
        config.end_session_on_close = true;
        Ok(Sink::new(backend, config))
    }
    /// Replace the message renderer
    pub fn with_renderer<R: MessageRenderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Box::new(renderer);
        self
    }
    pub fn config(&self) -> &SinkConfiguration {
        &self.config
    }
    pub fn backend(&self) -> &B {
        &self.backend
    }
    /// Forward `event` to the backend.
    ///
    /// Filtered events (& events raised while this thread is already emitting) are dropped
    /// silently. The only errors are those of the backend's write.
    pub fn emit(&self, event: &LogEvent) -> Result<()> {
        self.emit_from(event, Origin::Client)
    }
    pub(crate) fn emit_from(&self, event: &LogEvent, origin: Origin) -> Result<()> {
        let _guard = match EmitGuard::enter() {
            Some(guard) => guard,
            None => return Ok(()),
        };
        if !self.filter.accept(event.level()) {
            return Ok(());
        }
        let record = EnrichedRecord {
            timestamp: event.timestamp(),
            severity: Severity::from(event.level()),
            source_system: SOURCE_SYSTEM,
            category: self.categories.resolve(event),
            detail: self.details.resolve(event),
            call_site: self.call_site(event, origin),
            user_name: None,
            exception: event.exception().cloned(),
            message: self.renderer.render(event),
        };
        self.backend.write(WriteMode::Queued, record)
    }
    #[inline(never)]
    fn call_site(&self, event: &LogEvent, origin: Origin) -> Option<CallSite> {
        if !self.config.include_call_location {
            return None;
        }
        let trust = origin == Origin::Internal;
        if self.config.attribute_to_exception {
            if let Some(resolution) = event
                .exception()
                .and_then(|exc| self.resolver.resolve_exception(exc, trust))
            {
                return resolution.into_call_site();
            }
        }
        match origin {
            Origin::Client => self.resolver.resolve_live(0, false).into_call_site(),
            Origin::Internal => {
                let frames = capture::live_frames(0, MAX_FRAMES);
                let skip = dispatch_depth(&self.resolver, &frames);
                self.resolver.resolve(frames, skip, true).into_call_site()
            }
        }
    }
}

impl<B: Backend> Drop for Sink<B> {
    fn drop(&mut self) {
        if self.config.end_session_on_close {
            // There's no one left to tell
            let _ = self.backend.end_session();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::backend::MemoryBackend;
    use crate::category::DEFAULT_CATEGORY;
    use crate::event::ExceptionInfo;
    use crate::level::Level;

    use std::sync::Arc;

    fn memory_sink(config: SinkConfiguration) -> (Arc<MemoryBackend>, Sink<Arc<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), Sink::new(backend, config))
    }

    #[test]
    fn minimum_level() {
        let (backend, sink) = memory_sink(
            SinkConfiguration::builder()
                .minimum_level(Level::Information)
                .build(),
        );
        sink.emit(&LogEvent::new(Level::Debug, "not this one")).unwrap();
        sink.emit(&LogEvent::new(Level::Information, "this one")).unwrap();
        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "this one");
        assert_eq!(records[0].severity, Severity::Information);
        assert_eq!(records[0].source_system, "tracing");
        assert_eq!(records[0].user_name, None);
    }

    #[test]
    fn category_property() {
        let (backend, sink) = memory_sink(
            SinkConfiguration::builder()
                .category_property("LogCategory")
                .build(),
        );
        sink.emit(
            &LogEvent::new(Level::Information, "Cart {CartId} checked out")
                .with_property("LogCategory", "Checkout.Debug")
                .with_property("CartId", 11),
        )
        .unwrap();
        sink.emit(&LogEvent::new(Level::Information, "No category")).unwrap();
        let records = backend.records();
        assert_eq!(records[0].category, "Checkout.Debug");
        assert_eq!(records[0].message, "Cart 11 checked out");
        assert_eq!(records[1].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn details() {
        let (backend, sink) = memory_sink(SinkConfiguration::default());
        sink.emit(&LogEvent::new(Level::Information, "bare")).unwrap();
        sink.emit(&LogEvent::new(Level::Information, "{n}").with_property("n", 1))
            .unwrap();
        let records = backend.records();
        assert_eq!(records[0].detail, None);
        assert_eq!(
            records[1].detail.as_deref(),
            Some("{\r\n\t\"n\" : 1,\r\n}\r\n")
        );

        let (backend, sink) =
            memory_sink(SinkConfiguration::builder().render_properties(false).build());
        sink.emit(&LogEvent::new(Level::Information, "{n}").with_property("n", 1))
            .unwrap();
        assert_eq!(backend.records()[0].detail, None);
    }

    #[test]
    fn severities() {
        let (backend, sink) = memory_sink(SinkConfiguration::default());
        for level in [
            Level::Verbose,
            Level::Debug,
            Level::Information,
            Level::Warning,
            Level::Error,
            Level::Fatal,
        ] {
            sink.emit(&LogEvent::new(level, "x")).unwrap();
        }
        assert_eq!(
            backend
                .records()
                .iter()
                .map(|r| r.severity)
                .collect::<Vec<Severity>>(),
            vec![
                Severity::Verbose,
                Severity::Verbose,
                Severity::Information,
                Severity::Warning,
                Severity::Error,
                Severity::Critical
            ]
        );
    }

    #[test]
    fn no_call_location() {
        let (backend, sink) = memory_sink(
            SinkConfiguration::builder()
                .include_call_location(false)
                .build(),
        );
        sink.emit(&LogEvent::new(Level::Information, "x")).unwrap();
        assert_eq!(backend.records()[0].call_site, None);
    }

    #[test]
    fn exception_frames() {
        let (backend, sink) = memory_sink(
            SinkConfiguration::builder()
                .attribute_to_exception(true)
                .build(),
        );
        let mut exc = ExceptionInfo::new(&std::fmt::Error);
        exc.frames = Some(vec![
            StackFrameInfo::new("std::panicking", "begin_panic"),
            StackFrameInfo::new("shop::Cart", "total").at("src/cart.rs", 44),
            StackFrameInfo::new("shop::Checkout", "run").at("src/checkout.rs", 12),
        ]);
        sink.emit(&LogEvent::new(Level::Error, "failed").with_exception(exc))
            .unwrap();
        let record = &backend.records()[0];
        let site = record.call_site.as_ref().unwrap();
        assert_eq!(site.class_name.as_deref(), Some("shop::Cart"));
        assert_eq!(site.method_name, "total");
        assert_eq!(site.line_number, Some(44));
        assert!(record.exception.is_some());
    }

    struct Shouty;
    impl MessageRenderer for Shouty {
        fn render(&self, event: &LogEvent) -> String {
            event.template().to_uppercase()
        }
    }

    #[test]
    fn custom_renderer() {
        let (backend, sink) = memory_sink(SinkConfiguration::default());
        let sink = sink.with_renderer(Shouty);
        sink.emit(&LogEvent::new(Level::Information, "hi {n}").with_property("n", 1))
            .unwrap();
        assert_eq!(backend.records()[0].message, "HI {N}");
    }

    #[test]
    fn sessions() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let _sink = Sink::new(backend.clone(), SinkConfiguration::default());
        }
        assert_eq!(backend.sessions_ended(), 0);
        {
            let sink = Sink::with_session(
                backend.clone(),
                &SessionConfig {
                    product: Some("Shop".to_string()),
                    ..Default::default()
                },
                SinkConfiguration::default(),
            )
            .unwrap();
            assert!(sink.config().end_session_on_close);
        }
        assert_eq!(backend.sessions_started().len(), 1);
        assert_eq!(backend.sessions_ended(), 1);
    }

    #[test]
    fn reentrant_emits_are_dropped() {
        let (backend, sink) = memory_sink(SinkConfiguration::default());
        {
            let _outer = EmitGuard::enter().unwrap();
            assert!(EmitGuard::enter().is_none());
            sink.emit(&LogEvent::new(Level::Information, "inner")).unwrap();
        }
        assert!(backend.is_empty());
        sink.emit(&LogEvent::new(Level::Information, "outer")).unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn dispatch_depths() {
        let resolver = CallSiteResolver::default();
        let frames: Vec<Frame> = vec![
            Ok(StackFrameInfo::new("tracing_monitor::emitter::Sink<B>", "emit_from")),
            Ok(StackFrameInfo::new("tracing_monitor::layer::Layer<B>", "on_event")),
            Ok(StackFrameInfo::new("tracing_subscriber::layer::layered::Layered<L,S>", "event")),
            Ok(StackFrameInfo::new("tracing_core::dispatcher::Dispatch", "event")),
            Ok(StackFrameInfo::new("tracing_monitor::backend::MemoryBackend", "start_session")),
            Ok(StackFrameInfo::new("shop", "main")),
        ];
        let skip = dispatch_depth(&resolver, &frames);
        assert_eq!(skip, 4);
        let site = resolver.resolve(frames, skip, true).into_call_site().unwrap();
        assert_eq!(site.method_name, "start_session");
        assert_eq!(dispatch_depth(&resolver, &[]), 0);
    }
}
