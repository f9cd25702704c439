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

//! Picking the frame to blame.
//!
//! # The Walk
//!
//! Frames are visited innermost first. Each classified frame drives one transition of a small
//! state machine:
//!
//! ```text
//!                 System            Candidate (or trusted AdapterInternal)
//!   Scanning ───────────────▶ FoundSystem ───────────────────────────────▶ Selected
//!      │                                                                      ▲
//!      └──────────────── Candidate (or trusted AdapterInternal) ──────────────┘
//!
//!   Scanning/FoundSystem ── 200 frames inspected, or a frame can't be read ──▶ Exhausted
//! ```
//!
//! An untrusted AdapterInternal frame never changes the state. When the walk ends anywhere
//! other than `Selected`, we fall back to the first System frame seen, then to the first frame
//! of all, then to nothing.
//!
//! # Trusting the Skip Count
//!
//! Callers normally can't know how many of the frames nearest the capture point are ours (the
//! optimizer sees to that), so AdapterInternal frames are skipped by name. When the event was
//! raised by this crate itself, though, those frames *are* the source & the caller says so by
//! passing `trust_skip_frames`.

use super::{
    capture, classify::FrameClass, CallSite, FrameClassifier, FrameFault, FrameRules,
    StackFrameInfo,
};
use crate::event::ExceptionInfo;

/// No stack is plausibly this deep without containing the caller
pub const MAX_FRAMES: usize = 200;

/// How the attributed frame was chosen
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attribution {
    /// A frame passed the classification rules
    Selected,
    /// No frame passed; this is the first System frame seen
    FirstSystemFrame,
    /// No frame passed & there were no System frames; this is the first frame of all
    FirstFrame,
}

/// Why no call site could be produced
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unresolved {
    /// There were no frames to inspect
    NoFrames,
    /// The frame we fell back to has no function name
    NoMethod { frame: usize },
}

/// Why the walk stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Selected,
    /// We ran out of frames
    EndOfStack,
    /// We inspected [`MAX_FRAMES`] frames without making a selection
    FrameLimit,
    /// A frame couldn't be read
    Fault(FrameFault),
}

/// The outcome of a walk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        call_site: CallSite,
        /// Offset of the chosen frame in the (post-skip) sequence
        frame: usize,
        attribution: Attribution,
        stopped: StopReason,
    },
    Unresolved {
        reason: Unresolved,
        stopped: StopReason,
    },
}

impl Resolution {
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            Resolution::Resolved { call_site, .. } => Some(call_site),
            Resolution::Unresolved { .. } => None,
        }
    }
    pub fn into_call_site(self) -> Option<CallSite> {
        match self {
            Resolution::Resolved { call_site, .. } => Some(call_site),
            Resolution::Unresolved { .. } => None,
        }
    }
    pub fn stopped(&self) -> StopReason {
        match self {
            Resolution::Resolved { stopped, .. } | Resolution::Unresolved { stopped, .. } => {
                *stopped
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum WalkState {
    Scanning,
    FoundSystem { first_system: usize },
    Selected { frame: usize },
    Exhausted { first_system: Option<usize>, why: StopReason },
}

impl WalkState {
    fn first_system(&self) -> Option<usize> {
        match *self {
            WalkState::Scanning | WalkState::Selected { .. } => None,
            WalkState::FoundSystem { first_system } => Some(first_system),
            WalkState::Exhausted { first_system, .. } => first_system,
        }
    }
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            WalkState::Selected { .. } | WalkState::Exhausted { .. }
        )
    }
    fn exhaust(self, why: StopReason) -> WalkState {
        if self.is_terminal() {
            self
        } else {
            WalkState::Exhausted {
                first_system: self.first_system(),
                why,
            }
        }
    }
}

/// The transition function: `state`, having classified frame `index` as `class`.
fn step(state: WalkState, index: usize, class: FrameClass, trust_skip_frames: bool) -> WalkState {
    if state.is_terminal() {
        return state;
    }
    let first_system = state.first_system();
    match class {
        FrameClass::System => WalkState::FoundSystem {
            first_system: first_system.unwrap_or(index),
        },
        FrameClass::AdapterInternal if !trust_skip_frames => state,
        FrameClass::AdapterInternal | FrameClass::Candidate => {
            // Two distinct reasons to stop here: the caller vouches for its position in the
            // stack, or we've come back out of plumbing into unknown code.
            if trust_skip_frames || first_system.is_some() {
                WalkState::Selected { frame: index }
            } else if class == FrameClass::Candidate {
                WalkState::Selected { frame: index }
            } else {
                state
            }
        }
    }
}

/// Walks frame sequences to attribute log events to their callers.
#[derive(Clone, Debug, Default)]
pub struct CallSiteResolver {
    classifier: FrameClassifier,
}

impl CallSiteResolver {
    pub fn new(rules: FrameRules) -> CallSiteResolver {
        CallSiteResolver {
            classifier: FrameClassifier::new(rules),
        }
    }
    pub fn classifier(&self) -> &FrameClassifier {
        &self.classifier
    }
    /// Attribute a sequence of frames, skipping the first `skip`.
    ///
    /// Never inspects more than [`MAX_FRAMES`] frames past `skip`, whatever `frames` holds.
    pub fn resolve<I>(&self, frames: I, skip: usize, trust_skip_frames: bool) -> Resolution
    where
        I: IntoIterator<Item = Result<StackFrameInfo, FrameFault>>,
    {
        let mut inspected: Vec<StackFrameInfo> = Vec::new();
        let mut state = WalkState::Scanning;
        let mut frames = frames.into_iter().skip(skip);
        while !state.is_terminal() {
            if inspected.len() >= MAX_FRAMES {
                state = state.exhaust(StopReason::FrameLimit);
                break;
            }
            let frame = match frames.next() {
                None => {
                    state = state.exhaust(StopReason::EndOfStack);
                    break;
                }
                Some(Err(fault)) => {
                    state = state.exhaust(StopReason::Fault(fault));
                    break;
                }
                Some(Ok(frame)) if frame.method_name.is_none() => {
                    state = state.exhaust(StopReason::Fault(FrameFault::MissingMethod));
                    break;
                }
                Some(Ok(frame)) => frame,
            };
            let class = self.classifier.classify(&frame);
            state = step(state, inspected.len(), class, trust_skip_frames);
            inspected.push(frame);
        }
        if let WalkState::Selected { frame } = state {
            let budget = MAX_FRAMES.saturating_sub(inspected.len());
            if let Some(outer) = enclosing_frame(&inspected[frame], frames.take(budget)) {
                inspected[frame].file_name = outer.file_name;
                inspected[frame].line_number = outer.line_number;
            }
        }
        finish(state, &inspected)
    }
    /// Attribute the live stack. `skip` counts frames above our caller's (zero designates the
    /// caller itself).
    pub fn resolve_live(&self, skip: usize, trust_skip_frames: bool) -> Resolution {
        self.resolve(capture::live_frames(skip + 1, MAX_FRAMES), 0, trust_skip_frames)
    }
    /// Attribute the stack recorded with an exception; there's nothing to skip, since that stack
    /// begins where the error was raised. `None` if the exception recorded no stack.
    pub fn resolve_exception(
        &self,
        exception: &ExceptionInfo,
        trust_skip_frames: bool,
    ) -> Option<Resolution> {
        exception
            .frames
            .as_ref()
            .map(|frames| self.resolve(frames.iter().cloned().map(Ok), 0, trust_skip_frames))
    }
}

/// The frame of the function enclosing `closure`, if it comes next & knows its file.
///
/// A closure's location is where its code was written; for a closure expanded from a macro (the
/// `tracing` macros among them) that's the macro's own source. The enclosing function's frame
/// holds the line in the caller.
fn enclosing_frame<I>(closure: &StackFrameInfo, rest: I) -> Option<StackFrameInfo>
where
    I: Iterator<Item = Result<StackFrameInfo, FrameFault>>,
{
    if !closure.closure {
        return None;
    }
    for frame in rest {
        match frame {
            Ok(frame)
                if frame.type_name == closure.type_name
                    && frame.method_name == closure.method_name =>
            {
                if !frame.closure {
                    return frame.file_name.is_some().then_some(frame);
                }
            }
            _ => return None,
        }
    }
    None
}

fn finish(state: WalkState, inspected: &[StackFrameInfo]) -> Resolution {
    let (chosen, stopped) = match state {
        WalkState::Selected { frame } => (
            Some((frame, Attribution::Selected)),
            StopReason::Selected,
        ),
        WalkState::Exhausted { first_system, why } => (
            first_system
                .map(|idx| (idx, Attribution::FirstSystemFrame))
                .or_else(|| {
                    if inspected.is_empty() {
                        None
                    } else {
                        Some((0, Attribution::FirstFrame))
                    }
                }),
            why,
        ),
        // `resolve()` only leaves its loop in a terminal state
        WalkState::Scanning | WalkState::FoundSystem { .. } => (None, StopReason::EndOfStack),
    };
    match chosen {
        None => Resolution::Unresolved {
            reason: Unresolved::NoFrames,
            stopped,
        },
        Some((frame, attribution)) => match CallSite::from_frame(&inspected[frame]) {
            Some(call_site) => Resolution::Resolved {
                call_site,
                frame,
                attribution,
                stopped,
            },
            None => Resolution::Unresolved {
                reason: Unresolved::NoMethod { frame },
                stopped,
            },
        },
    }
}
