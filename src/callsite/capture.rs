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

//! Capturing stack frames via [`backtrace`].
//!
//! [`backtrace`]: https://docs.rs/backtrace
//!
//! Rust has no reflection to ask a frame for its declaring type, so we recover one from the
//! demangled symbol name: `shop::cart::Cart::total` is method `total` of `shop::cart::Cart`,
//! `<shop::Cart as core::fmt::Debug>::fmt` is method `fmt` of `shop::Cart`, and a closure is
//! blamed on the function that contains it. Each inlined function at a frame is reported as a
//! frame of its own, innermost first.

use super::{FrameFault, StackFrameInfo};

use backtrace::{Backtrace, SymbolName};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Split `text` on "::", ignoring any that appear inside brackets
fn top_level_segments(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'(' | b'[' => depth += 1,
            // the '>' of a "->" doesn't close anything
            b'>' if i > 0 && bytes[i - 1] == b'-' => (),
            b'>' | b')' | b']' => depth -= 1,
            b':' if depth == 0 && i + 1 < bytes.len() && bytes[i + 1] == b':' => {
                segments.push(&text[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => (),
        }
        i += 1;
    }
    segments.push(&text[start..]);
    segments
}

/// Split a qualified self, `<A as B>` or `<A>`, into `A` & (if present) `B`
fn qualified_self(segment: &str) -> (&str, Option<&str>) {
    let inner = &segment[1..segment.len() - 1];
    let bytes = inner.as_bytes();
    let mut depth = 0i32;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'<' | b'(' | b'[' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'-' => (),
            b'>' | b')' | b']' => depth -= 1,
            b' ' if depth == 0 && inner[i..].starts_with(" as ") => {
                return (&inner[..i], Some(&inner[i + 4..]))
            }
            _ => (),
        }
    }
    (inner, None)
}

fn strip_pointer_sigils(mut ty: &str) -> &str {
    loop {
        let next = ty
            .trim_start_matches('&')
            .trim_start_matches("mut ")
            .trim_start_matches("dyn ")
            .trim_start_matches("*const ")
            .trim_start_matches("*mut ");
        if next == ty {
            return ty;
        }
        ty = next;
    }
}

/// The crate named at the head of `ty`'s path; `None` for generic parameters, function pointers,
/// slices, tuples & the like
fn path_crate(ty: &str) -> Option<&str> {
    let krate = &ty[..ty.find("::")?];
    if !krate.is_empty() && krate.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(krate)
    } else {
        None
    }
}

fn is_qualified_self(segment: &str) -> bool {
    segment.len() > 1 && segment.starts_with('<') && segment.ends_with('>')
}

/// A demangled symbol, taken apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Symbol {
    /// Fully-qualified path of the declaring type (or module)
    pub(crate) type_name: Option<String>,
    pub(crate) method_name: String,
    /// The crate containing the function
    pub(crate) module: String,
    /// Named for the function enclosing a closure (or shim)
    pub(crate) folded: bool,
}

/// Take apart a demangled symbol, legacy or v0.
///
/// Trailing generic arguments are dropped & closures fold into their enclosing function. For
/// `<A as B>::m` the declaring type is `A`; when `A` names no crate of its own (a generic
/// parameter, say, or `fn() -> R`) the function belongs to the crate of `B`, & failing that to
/// the standard library, the only crate that can implement methods on built-in types.
pub(crate) fn split_symbol(symbol: &str) -> Option<Symbol> {
    let mut segments = top_level_segments(symbol);
    let mut folded = false;
    while segments.len() > 1 {
        match segments.last() {
            Some(s) if s.starts_with('{') => folded = true,
            Some(s) if s.starts_with('<') => (),
            _ => break,
        }
        segments.pop();
    }
    let method = segments.pop().filter(|m| !m.is_empty() && !m.starts_with('<'))?;
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            return Some(Symbol {
                type_name: None,
                method_name: method.to_string(),
                module: String::new(),
                folded,
            })
        }
    };
    // generic arguments & legacy `<impl T>` blocks along the way are not part of the type
    let rest = rest.iter().filter(|s| !s.starts_with('<'));
    let (type_name, module) = if is_qualified_self(head) {
        let (self_ty, trait_ty) = qualified_self(head);
        let self_ty = strip_pointer_sigils(self_ty);
        let module = path_crate(self_ty)
            .or_else(|| trait_ty.and_then(path_crate))
            .unwrap_or("core");
        let type_name = std::iter::once(self_ty)
            .chain(rest.copied())
            .collect::<Vec<&str>>()
            .join("::");
        (type_name, module.to_string())
    } else {
        let type_name = std::iter::once(*head)
            .chain(rest.copied())
            .collect::<Vec<&str>>()
            .join("::");
        (type_name, head.to_string())
    };
    Some(Symbol {
        type_name: Some(type_name),
        method_name: method.to_string(),
        module,
        folded,
    })
}

fn frame_from_symbol(
    name: Option<SymbolName<'_>>,
    filename: Option<&Path>,
    lineno: Option<u32>,
) -> Result<StackFrameInfo, FrameFault> {
    let symbol = name.map(|n| format!("{:#}", n)).ok_or(FrameFault::Unresolved)?;
    let symbol = split_symbol(&symbol).ok_or(FrameFault::MissingMethod)?;
    let file_name = filename.map(|p| p.display().to_string());
    Ok(StackFrameInfo {
        type_name: symbol.type_name,
        method_name: Some(symbol.method_name),
        module: symbol.module,
        line_number: file_name.as_ref().and(lineno),
        file_name,
        closure: symbol.folded,
    })
}

fn is_capture_machinery(frame: &Result<StackFrameInfo, FrameFault>) -> bool {
    match frame {
        Ok(f) => f
            .type_name
            .as_deref()
            .map_or(false, |t| t.starts_with("backtrace::")),
        Err(_) => false,
    }
}

fn is_live_frames(frame: &Result<StackFrameInfo, FrameFault>) -> bool {
    match frame {
        Ok(f) => {
            f.method_name.as_deref() == Some("live_frames")
                && f
                    .type_name
                    .as_deref()
                    .map_or(false, |t| t.ends_with("callsite::capture"))
        }
        Err(_) => false,
    }
}

// How deep we'll look for ourselves beneath the unwinder
const MACHINERY_DEPTH: usize = 32;

/// Capture the live stack.
///
/// The frames of the capture machinery are dropped, as are `skip` frames above our caller (so
/// zero designates the caller itself). At most `limit` frames are returned. Capture stops at
/// the first frame whose symbolization panics, which is reported as [`FrameFault::Panicked`].
#[inline(never)]
pub fn live_frames(skip: usize, limit: usize) -> Vec<Result<StackFrameInfo, FrameFault>> {
    let budget = skip.saturating_add(limit).saturating_add(MACHINERY_DEPTH);
    let mut raw: Vec<Result<StackFrameInfo, FrameFault>> = Vec::new();
    backtrace::trace(|frame| {
        let mut symbols = Vec::new();
        let resolved = catch_unwind(AssertUnwindSafe(|| {
            backtrace::resolve_frame(frame, |symbol| {
                symbols.push(frame_from_symbol(
                    symbol.name(),
                    symbol.filename(),
                    symbol.lineno(),
                ));
            })
        }));
        if resolved.is_err() {
            raw.push(Err(FrameFault::Panicked));
            return false;
        }
        if symbols.is_empty() {
            symbols.push(Err(FrameFault::Unresolved));
        }
        raw.extend(symbols);
        raw.len() < budget
    });
    // Find our own frame; failing that, assume it sits just below the unwinder's.
    let start = match raw.iter().take(MACHINERY_DEPTH).position(is_live_frames) {
        Some(ours) => ours + 1,
        None => raw.iter().take_while(|f| is_capture_machinery(f)).count() + 1,
    };
    raw.into_iter()
        .skip(start.saturating_add(skip))
        .take(limit)
        .collect()
}

/// The frames of a resolved [`Backtrace`], innermost first. Frames that can't be symbolized are
/// kept (with no method name) so that offsets are preserved.
pub fn frames_from_backtrace(back: &Backtrace) -> Vec<StackFrameInfo> {
    let mut frames = Vec::new();
    for frame in back.frames() {
        let symbols = frame.symbols();
        if symbols.is_empty() {
            frames.push(StackFrameInfo::default());
        }
        for symbol in symbols {
            frames.push(
                frame_from_symbol(symbol.name(), symbol.filename(), symbol.lineno())
                    .unwrap_or_default(),
            );
        }
    }
    frames
}
