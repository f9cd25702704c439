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

//! # General tracing-monitor Documentation
//!
//! ## Introduction
//!
//! General (i.e. not documenting a particular struct or a method) documentation goes here.
//!
//! ## From tracing Events to Backend Records
//!
//! The translation from tracing [Event]s to monitoring records happens in three steps:
//!
//! [Event]: tracing::Event
//!
//! 1. converting the [Event] to a [LogEvent]
//! 2. running the [LogEvent] through the [Sink]'s pipeline to get an [EnrichedRecord]
//! 3. handing that record to a [Backend]
//!
//! [LogEvent]: crate::event::LogEvent
//! [Sink]: crate::emitter::Sink
//! [EnrichedRecord]: crate::backend::EnrichedRecord
//! [Backend]: crate::backend::Backend
//!
//! ### Converting a Tracing Event
//!
//! Fields become properties, in field order. The "message" field becomes the message; since
//! `tracing` has already formatted it, it's escaped so as to render verbatim. Fields of the spans
//! enclosing the event are properties too (an event field of the same name wins). The first field
//! recorded as a `dyn Error` is attached to the event as its exception.
//!
//! ### The Pipeline
//!
//! The [Sink] first checks the event's level against the configured minimum; if the event is
//! dropped, nothing further is done with it. Otherwise it derives, independently:
//!
//! - the backend [Severity] (Verbose & Debug both map to Verbose; Fatal maps to Critical)
//! - the category, from a configurable property or a fixed default
//! - the detail, a rendering of all the event's properties
//! - the call site, by walking the stack (see [callsite])
//! - the message, by rendering the event's template against its properties
//!
//! [Severity]: crate::level::Severity
//! [callsite]: crate::callsite
//!
//! ### Backends
//!
//! The [Backend] trait is the write contract: one call per record, which must not block on
//! persistence. This crate provides an in-memory implementation ([MemoryBackend]) & one that
//! ships records from a worker thread ([QueuedBackend]) via a [RecordFormatter] & a [Transport]:
//!
//! [MemoryBackend]: crate::backend::MemoryBackend
//! [QueuedBackend]: crate::backend::QueuedBackend
//! [RecordFormatter]: crate::formatter::RecordFormatter
//! [Transport]: crate::transport::Transport
//!
//! - [TcpTransport](crate::transport::TcpTransport)
//! - [UdpTransport](crate::transport::UdpTransport)
//! - [UnixSocket](crate::transport::UnixSocket)
//!
//! ## How This Process Plugs-In to the Tracing Framework
//!
//! This process connects to the tracing framework through the [Layer] type, which implements
//! [tracing_subscriber::layer::Layer], so it can be "stacked" on top of other layers in your
//! tracing [Subscriber]. It needs span storage ([LookupSpan]) to find span fields.
//!
//! [Layer]: crate::layer::Layer
//! [Subscriber]: tracing::Subscriber
//! [LookupSpan]: tracing_subscriber::registry::LookupSpan
//!
//! ## Our Own Diagnostics
//!
//! This crate logs a little about itself (spawning its writer thread, starting sessions) under the
//! `tracing_monitor` target. When those events come back around through the [Layer], they're
//! attributed to the code in this crate that raised them, rather than to whoever called it.
//! Nothing is logged while an event is being emitted, nor from the writer thread; an event raised
//! on a thread that's already emitting is dropped.
