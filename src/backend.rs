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

//! The monitoring backend's write contract, & two implementations of it.
//!
//! A [`Backend`] is whatever durably records [`EnrichedRecord`]s. The [`Sink`] only ever calls
//! [`Backend::write`] with [`WriteMode::Queued`]: persistence is the backend's business & must
//! not hold up the thread that logged.
//!
//! [`MemoryBackend`] just collects records; it's useful in tests. [`QueuedBackend`] hands each
//! record to a worker thread which formats it with a [`RecordFormatter`] & ships it to an agent
//! over a [`Transport`].
//!
//! [`Sink`]: crate::emitter::Sink

use crate::callsite::CallSite;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::event::ExceptionInfo;
use crate::formatter::{Payload, RecordFormatter};
use crate::level::Severity;
use crate::transport::Transport;

use backtrace::Backtrace;
use chrono::prelude::*;
use serde::Serialize;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    mpsc, Arc, Mutex, MutexGuard,
};
use std::thread::JoinHandle;

/// The source system named on every record this crate produces
pub const SOURCE_SYSTEM: &str = "tracing";

/// How long [`Backend::write`] may take
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Return as soon as the record is queued
    Queued,
    /// Return once the record has been handed off to the agent
    WaitForCommit,
}

/// Everything the backend records about one event
#[derive(Clone, Debug, Serialize)]
pub struct EnrichedRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub source_system: &'static str,
    pub category: String,
    pub call_site: Option<CallSite>,
    /// Left to the backend to infer
    pub user_name: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub detail: Option<String>,
    pub message: String,
}

/// The backend write contract.
///
/// Implementations must be callable from any thread.
pub trait Backend: Send + Sync {
    fn write(&self, mode: WriteMode, record: EnrichedRecord) -> Result<()>;
    fn start_session(&self, _config: &SessionConfig) -> Result<()> {
        Ok(())
    }
    fn end_session(&self) -> Result<()> {
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn write(&self, mode: WriteMode, record: EnrichedRecord) -> Result<()> {
        (**self).write(mode, record)
    }
    fn start_session(&self, config: &SessionConfig) -> Result<()> {
        (**self).start_session(config)
    }
    fn end_session(&self) -> Result<()> {
        (**self).end_session()
    }
}

// A panic elsewhere doesn't make a list of records any less valid
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         MemoryBackend                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`Backend`] that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<EnrichedRecord>>,
    sessions: Mutex<Vec<SessionConfig>>,
    ended: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }
    /// A copy of every record written so far
    pub fn records(&self) -> Vec<EnrichedRecord> {
        lock(&self.records).clone()
    }
    /// Remove & return every record written so far
    pub fn take(&self) -> Vec<EnrichedRecord> {
        std::mem::take(&mut *lock(&self.records))
    }
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The configuration of each session started, in order
    pub fn sessions_started(&self) -> Vec<SessionConfig> {
        lock(&self.sessions).clone()
    }
    pub fn sessions_ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

impl Backend for MemoryBackend {
    fn write(&self, _mode: WriteMode, record: EnrichedRecord) -> Result<()> {
        lock(&self.records).push(record);
        Ok(())
    }
    fn start_session(&self, config: &SessionConfig) -> Result<()> {
        lock(&self.sessions).push(config.clone());
        Ok(())
    }
    fn end_session(&self) -> Result<()> {
        self.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         QueuedBackend                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

enum Command {
    Start(SessionConfig),
    Write(EnrichedRecord),
    Commit(mpsc::SyncSender<()>),
    End,
}

fn send_payload<F, T>(formatter: &F, transport: &T, payload: Payload<'_>) -> bool
where
    F: RecordFormatter,
    T: Transport<F>,
{
    formatter
        .format(payload)
        .ok()
        .map_or(false, |buf| transport.send(buf).is_ok())
}

// Nothing in here may log: we'd be feeding the very queue we're draining.
fn drain<F, T>(formatter: F, transport: T, commands: mpsc::Receiver<Command>, failed: Arc<AtomicU64>)
where
    F: RecordFormatter,
    T: Transport<F>,
{
    for command in commands {
        let sent = match command {
            Command::Start(config) => {
                send_payload(&formatter, &transport, Payload::SessionStarted(&config))
            }
            Command::Write(record) => {
                send_payload(&formatter, &transport, Payload::Record(&record))
            }
            Command::End => send_payload(&formatter, &transport, Payload::SessionEnded),
            Command::Commit(ack) => {
                // The committer may have given up on us; that's fine.
                let _ = ack.send(());
                true
            }
        };
        if !sent {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A [`Backend`] that writes from a dedicated thread.
///
/// Records are formatted with `F` & sent over `T` in the order in which they were queued. The
/// worker runs until the session is ended or the backend dropped, either of which drains the
/// queue first. There is at most one session per backend.
pub struct QueuedBackend<F, T> {
    sender: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    failed: Arc<AtomicU64>,
    in_session: AtomicBool,
    phantom: std::marker::PhantomData<fn(F, T)>,
}

impl<F, T> QueuedBackend<F, T>
where
    F: RecordFormatter + Send + 'static,
    T: Transport<F> + Send + 'static,
{
    pub fn new(formatter: F, transport: T) -> Result<QueuedBackend<F, T>> {
        let (sender, receiver) = mpsc::channel();
        let failed = Arc::new(AtomicU64::new(0));
        let counter = failed.clone();
        let worker = std::thread::Builder::new()
            .name("tracing-monitor-writer".to_string())
            .spawn(move || drain(formatter, transport, receiver, counter))
            .map_err(|err| Error::Transport {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
        tracing::debug!("spawned record writer thread");
        Ok(QueuedBackend {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            failed,
            in_session: AtomicBool::new(false),
            phantom: std::marker::PhantomData,
        })
    }
}

impl<F, T> QueuedBackend<F, T> {
    /// The number of payloads that couldn't be formatted or sent
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
    fn submit(&self, command: Command) -> Result<()> {
        lock(&self.sender)
            .as_ref()
            .ok_or_else(|| Error::QueueClosed {
                back: Backtrace::new(),
            })?
            .send(command)
            .map_err(|_| Error::QueueClosed {
                back: Backtrace::new(),
            })
    }
    /// Close the queue & wait for the worker to drain it
    fn shutdown(&self) {
        drop(lock(&self.sender).take());
        if let Some(worker) = lock(&self.worker).take() {
            // A worker panic has already cost us the records; there's no one to tell.
            let _ = worker.join();
        }
    }
}

impl<F, T> Backend for QueuedBackend<F, T> {
    fn write(&self, mode: WriteMode, record: EnrichedRecord) -> Result<()> {
        self.submit(Command::Write(record))?;
        if mode == WriteMode::WaitForCommit {
            let (ack, committed) = mpsc::sync_channel(1);
            self.submit(Command::Commit(ack))?;
            committed.recv().map_err(|_| Error::QueueClosed {
                back: Backtrace::new(),
            })?;
        }
        Ok(())
    }
    fn start_session(&self, config: &SessionConfig) -> Result<()> {
        if self.in_session.swap(true, Ordering::AcqRel) {
            return Err(Error::Session {
                reason: "a session is already in progress".to_string(),
                back: Backtrace::new(),
            });
        }
        if let Err(err) = self.submit(Command::Start(config.clone())) {
            self.in_session.store(false, Ordering::Release);
            return Err(err);
        }
        tracing::debug!(
            product = config.product.as_deref().unwrap_or("-"),
            application = config.application.as_deref().unwrap_or("-"),
            "monitoring session started"
        );
        Ok(())
    }
    fn end_session(&self) -> Result<()> {
        if !self.in_session.swap(false, Ordering::AcqRel) {
            return Err(Error::Session {
                reason: "no session is in progress".to_string(),
                back: Backtrace::new(),
            });
        }
        self.submit(Command::End)?;
        self.shutdown();
        Ok(())
    }
}

impl<F, T> Drop for QueuedBackend<F, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
