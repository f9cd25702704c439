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

//! Call-site attribution.
//!
//! # Introduction
//!
//! Every record we forward names the code that produced it: class (well, declaring type or
//! module path), method, file & line. The `tracing` macros already know *where* they were
//! expanded, but that's rarely who is to blame: a helper that logs on behalf of its caller, a
//! `log`-crate shim, or an error raised three frames below the `error!()` all want the blame
//! placed elsewhere. So we walk the stack.
//!
//! The walk is in three parts:
//!
//! 1. capturing frames, either from the live stack or from the stack recorded with an error
//!    ([`capture`])
//!
//! 2. classifying each frame as platform/front-end plumbing, our own plumbing, or (presumably)
//!    caller code ([`classify`])
//!
//! 3. picking the one frame to blame ([`resolve`])
//!
//! None of this is allowed to fail: the worst outcome is a record with no call site.

pub mod capture;
pub mod classify;
pub mod resolve;

pub use classify::{FrameClass, FrameClassifier, FrameRules};
pub use resolve::{Attribution, CallSiteResolver, Resolution, StopReason, Unresolved};

use serde::{Deserialize, Serialize};

/// One frame of a captured stack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrameInfo {
    /// Fully-qualified path of the type (or module) declaring the function
    pub type_name: Option<String>,
    pub method_name: Option<String>,
    /// The crate containing the function; empty when unknown
    pub module: String,
    pub file_name: Option<String>,
    /// Only meaningful if `file_name` is present
    pub line_number: Option<u32>,
    /// The function is a closure, named for the function enclosing it
    #[serde(default)]
    pub closure: bool,
}

impl StackFrameInfo {
    pub fn new<T: Into<String>, M: Into<String>>(type_name: T, method_name: M) -> StackFrameInfo {
        let type_name = type_name.into();
        StackFrameInfo {
            module: classify::crate_of(&type_name).to_string(),
            type_name: Some(type_name),
            method_name: Some(method_name.into()),
            file_name: None,
            line_number: None,
            closure: false,
        }
    }
    pub fn in_module<M: Into<String>>(mut self, module: M) -> Self {
        self.module = module.into();
        self
    }
    pub fn at<F: Into<String>>(mut self, file_name: F, line_number: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = Some(line_number);
        self
    }
    pub fn in_closure(mut self) -> Self {
        self.closure = true;
        self
    }
}

/// Reasons a frame could not be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFault {
    /// No symbol information was available for the frame's instruction pointer
    Unresolved,
    /// The frame resolved, but to no function name
    MissingMethod,
    /// Symbolization panicked
    Panicked,
}

/// The code location to which a log event is attributed.
///
/// This is all-or-nothing: either we found a frame to blame & this is populated from it, or the
/// record carries no call site at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub class_name: Option<String>,
    pub method_name: String,
    pub file_name: Option<String>,
    /// `None` unless `file_name` is known
    pub line_number: Option<u32>,
}

impl CallSite {
    fn from_frame(frame: &StackFrameInfo) -> Option<CallSite> {
        let method_name = frame.method_name.clone()?;
        let (file_name, line_number) = match frame.file_name.as_ref() {
            Some(file) if !file.is_empty() => (Some(file.clone()), frame.line_number),
            _ => (None, None),
        };
        Some(CallSite {
            class_name: frame.type_name.clone(),
            method_name,
            file_name,
            line_number,
        })
    }
}
