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

//! A [`tracing-subscriber`] [`Layer`] implementation for forwarding [`tracing`] [`Event`]s to a
//! monitoring backend, attributed to the code that produced them
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/0.1.35/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! # Introduction
//!
//! The [`tracing`] crate is a "scoped, structured logging and diagnostics system". It makes a very
//! clear distinction between producers of events & their consumers ([`Subscriber`]s, in
//! [`tracing`] parlance), and the [`tracing-subscriber`] crate lets a consumer be assembled from
//! [`Layer`]s, each handling one facet of what's to be done with the events.
//!
//! [`Subscriber`]: https://docs.rs/tracing/0.1.34/tracing/trait.Subscriber.html
//!
//! This crate provides a [`Layer`] that forwards events to a monitoring backend, preserving their
//! structure (severity, properties, errors) & naming the code responsible for each: its type,
//! function, file & line. That last is less simple than it sounds: the code that invoked the
//! `tracing` macro is often a helper logging on its caller's behalf, & the code that raised an
//! error is rarely the code that logged it. See [`callsite`] for how we go about it.
//!
//! # Usage
//!
//! ```rust
//! use tracing::info;
//! use tracing_monitor::backend::MemoryBackend;
//! use tracing_monitor::config::SinkConfiguration;
//! use tracing_monitor::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let subscriber = Registry::default()
//!     .with(Layer::new(backend.clone(), SinkConfiguration::default()));
//! tracing::subscriber::with_default(subscriber, || {
//!     info!(cart = 11, "Hello, world!");
//! });
//!
//! let records = backend.records();
//! assert_eq!(records[0].message, "Hello, world!");
//! assert_eq!(records[0].detail.as_deref(), Some("{\r\n\t\"cart\" : 11,\r\n}\r\n"));
//! ```
//!
//! To ship records to an agent, use a [`QueuedBackend`](crate::backend::QueuedBackend):
//!
//! ```no_run
//! use tracing::info;
//! use tracing_monitor::backend::QueuedBackend;
//! use tracing_monitor::config::{SessionConfig, SinkConfiguration};
//! use tracing_monitor::formatter::JsonLines;
//! use tracing_monitor::layer::Layer;
//! use tracing_monitor::level::Level;
//! use tracing_monitor::transport::UdpTransport;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let backend = QueuedBackend::new(
//!     JsonLines::default(),
//!     UdpTransport::new("monitor.local:4520").unwrap(),
//! )
//! .unwrap();
//! let config = SinkConfiguration::builder()
//!     .minimum_level(Level::Information)
//!     .category_property("LogCategory")
//!     .build();
//! let session = SessionConfig {
//!     product: Some("Shop".to_string()),
//!     ..Default::default()
//! };
//! let subscriber =
//!     Registry::default().with(Layer::with_session(backend, &session, config).unwrap());
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! info!(LogCategory = "Checkout", "Hello, world!");
//! ```
//!
//! Events needn't come through [`tracing`] at all: a [`Sink`](crate::emitter::Sink) will
//! accept hand-built [`LogEvent`](crate::event::LogEvent)s.

pub mod _docs;
pub mod backend;
pub mod callsite;
pub mod category;
pub mod config;
pub mod detail;
pub mod emitter;
pub mod error;
pub mod event;
pub mod filter;
pub mod formatter;
pub mod layer;
pub mod level;
pub mod render;
pub mod tracing;
pub mod transport;
