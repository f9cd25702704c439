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

//! Attribution against the live stack.
//!
//! These live outside the library because the library's own frames are, by definition, never
//! selectable: only code in another crate can be blamed for an event.

use tracing_monitor::{
    backend::MemoryBackend,
    callsite::CallSite,
    config::SinkConfiguration,
    emitter::Sink,
    event::{ExceptionInfo, LogEvent},
    layer::Layer,
    level::Level,
};

use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

use std::sync::Arc;

#[derive(Debug)]
struct OutOfStock;

impl std::fmt::Display for OutOfStock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "out of stock")
    }
}

impl std::error::Error for OutOfStock {}

fn memory_sink(config: SinkConfiguration) -> (Arc<MemoryBackend>, Sink<Arc<MemoryBackend>>) {
    let backend = Arc::new(MemoryBackend::new());
    (backend.clone(), Sink::new(backend, config))
}

fn only_call_site(backend: &MemoryBackend) -> CallSite {
    let records = backend.records();
    assert_eq!(records.len(), 1);
    records[0]
        .call_site
        .clone()
        .expect("the record should carry a call site")
}

fn assert_in_this_file(site: &CallSite) {
    assert!(site
        .file_name
        .as_deref()
        .map_or(false, |file| file.ends_with("attribution.rs")));
    assert!(site.line_number.is_some());
}

#[inline(never)]
fn check_out(sink: &Sink<Arc<MemoryBackend>>) {
    sink.emit(&LogEvent::new(Level::Information, "checked out"))
        .unwrap();
}

#[test]
fn direct_emit() {
    let (backend, sink) = memory_sink(SinkConfiguration::default());
    check_out(&sink);
    let site = only_call_site(&backend);
    assert_eq!(site.method_name, "check_out");
    assert_eq!(site.class_name.as_deref(), Some("attribution"));
    assert_in_this_file(&site);
}

const DECLINE_PAYMENT_LINE: u32 = line!() + 3;
#[inline(never)]
fn decline_payment() {
    tracing::warn!(cart = 11, "payment declined");
}

#[inline(never)]
fn generic_client<T: std::fmt::Debug>(value: T) {
    tracing::info!(?value, "generic");
}

#[test]
fn through_tracing_from_generic_code() {
    let backend = Arc::new(MemoryBackend::new());
    let subscriber =
        Registry::default().with(Layer::new(backend.clone(), SinkConfiguration::default()));
    tracing::subscriber::with_default(subscriber, || generic_client(11u32));
    let site = only_call_site(&backend);
    assert_eq!(site.method_name, "generic_client");
    assert_in_this_file(&site);
}

#[test]
fn through_tracing() {
    let backend = Arc::new(MemoryBackend::new());
    let subscriber =
        Registry::default().with(Layer::new(backend.clone(), SinkConfiguration::default()));
    tracing::subscriber::with_default(subscriber, decline_payment);
    let site = only_call_site(&backend);
    assert_eq!(site.method_name, "decline_payment");
    assert_eq!(site.class_name.as_deref(), Some("attribution"));
    // the line of the `warn!`, not of the macro's definition
    assert_in_this_file(&site);
    assert_eq!(site.line_number, Some(DECLINE_PAYMENT_LINE));
}

#[inline(never)]
fn reserve_stock() -> Result<(), ExceptionInfo> {
    Err(ExceptionInfo::capture(&OutOfStock))
}

#[inline(never)]
fn place_order(sink: &Sink<Arc<MemoryBackend>>) {
    if let Err(exc) = reserve_stock() {
        sink.emit(&LogEvent::new(Level::Error, "order failed").with_exception(exc))
            .unwrap();
    }
}

#[test]
fn attributed_to_the_raise_site() {
    let (backend, sink) = memory_sink(
        SinkConfiguration::builder()
            .attribute_to_exception(true)
            .build(),
    );
    place_order(&sink);
    let site = only_call_site(&backend);
    assert_eq!(site.method_name, "reserve_stock");
    assert_in_this_file(&site);
}

#[test]
fn attributed_to_the_logger() {
    let (backend, sink) = memory_sink(SinkConfiguration::default());
    place_order(&sink);
    let site = only_call_site(&backend);
    assert_eq!(site.method_name, "place_order");
    assert_in_this_file(&site);
}

#[test]
fn from_many_threads() {
    let (backend, sink) = memory_sink(SinkConfiguration::default());
    let sink = Arc::new(sink);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sink = sink.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    check_out(&sink);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let records = backend.records();
    assert_eq!(records.len(), 100);
    assert!(records
        .iter()
        .all(|r| r.call_site.as_ref().map(|s| s.method_name.as_str()) == Some("check_out")));
}
