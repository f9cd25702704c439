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

//! Deciding whose frame this is.
//!
//! [`FrameRules`] is the one place that says what counts as plumbing. The defaults describe the
//! Rust standard library, the `tracing` family of crates & this crate; a caller bridging from
//! some other front end supplies its own table.

use super::StackFrameInfo;

use serde::{Deserialize, Serialize};

/// What a frame is, for purposes of attribution
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameClass {
    /// Platform, runtime, or logging front end code
    System,
    /// This crate's own code
    AdapterInternal,
    /// Anything else: presumably the caller
    Candidate,
}

/// The prefix rules behind a [`FrameClassifier`].
///
/// Type prefixes are matched without regard to ASCII case; module names must match exactly, as
/// must system symbols, which only apply to frames with no declaring type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameRules {
    pub system_type_prefixes: Vec<String>,
    pub system_modules: Vec<String>,
    /// Functions with no path at all (the C runtime's, mostly) that are plumbing
    pub system_symbols: Vec<String>,
    pub front_end_type_prefixes: Vec<String>,
    pub adapter_type_prefixes: Vec<String>,
    pub adapter_modules: Vec<String>,
}

fn strings(x: &[&str]) -> Vec<String> {
    x.iter().map(|s| s.to_string()).collect()
}

impl std::default::Default for FrameRules {
    fn default() -> Self {
        FrameRules {
            system_type_prefixes: strings(&["std::", "core::", "alloc::", "backtrace::"]),
            system_modules: strings(&["std", "core", "alloc", "test", "panic_unwind"]),
            system_symbols: strings(&[
                "main",
                "_start",
                "__libc_start_main",
                "__libc_start_call_main",
                "start_thread",
                "clone",
                "clone3",
                "thread_start",
                "_pthread_start",
                "mainCRTStartup",
                "__scrt_common_main_seh",
                "BaseThreadInitThunk",
                "RtlUserThreadStart",
                "__rust_try",
            ]),
            front_end_type_prefixes: strings(&[
                "tracing::",
                "tracing_core::",
                "tracing_subscriber::",
                "tracing_log::",
                "log::",
            ]),
            adapter_type_prefixes: strings(&["tracing_monitor::"]),
            adapter_modules: strings(&["tracing_monitor"]),
        }
    }
}

impl FrameRules {
    /// A table with no rules at all; every frame is a [`FrameClass::Candidate`]
    pub fn empty() -> FrameRules {
        FrameRules {
            system_type_prefixes: Vec::new(),
            system_modules: Vec::new(),
            system_symbols: Vec::new(),
            front_end_type_prefixes: Vec::new(),
            adapter_type_prefixes: Vec::new(),
            adapter_modules: Vec::new(),
        }
    }
    pub fn system_type_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.system_type_prefixes.push(prefix.into());
        self
    }
    pub fn system_module<S: Into<String>>(mut self, module: S) -> Self {
        self.system_modules.push(module.into());
        self
    }
    pub fn system_symbol<S: Into<String>>(mut self, symbol: S) -> Self {
        self.system_symbols.push(symbol.into());
        self
    }
    pub fn front_end_type_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.front_end_type_prefixes.push(prefix.into());
        self
    }
    pub fn adapter_type_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.adapter_type_prefixes.push(prefix.into());
        self
    }
    pub fn adapter_module<S: Into<String>>(mut self, module: S) -> Self {
        self.adapter_modules.push(module.into());
        self
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn any_prefix(text: Option<&str>, prefixes: &[String]) -> bool {
    text.map(|t| prefixes.iter().any(|p| starts_with_ignore_case(t, p)))
        .unwrap_or(false)
}

fn is_system_symbol(frame: &StackFrameInfo, symbols: &[String]) -> bool {
    frame.type_name.is_none()
        && frame
            .method_name
            .as_deref()
            .map_or(false, |m| symbols.iter().any(|s| s == m))
}

/// Classifies [`StackFrameInfo`]s according to a [`FrameRules`] table
#[derive(Clone, Debug, Default)]
pub struct FrameClassifier {
    rules: FrameRules,
}

impl FrameClassifier {
    pub fn new(rules: FrameRules) -> FrameClassifier {
        FrameClassifier { rules }
    }
    pub fn rules(&self) -> &FrameRules {
        &self.rules
    }
    pub fn classify(&self, frame: &StackFrameInfo) -> FrameClass {
        let type_name = frame.type_name.as_deref();
        let rules = &self.rules;
        if any_prefix(type_name, &rules.system_type_prefixes)
            || rules.system_modules.iter().any(|m| *m == frame.module)
            || is_system_symbol(frame, &rules.system_symbols)
            || any_prefix(type_name, &rules.front_end_type_prefixes)
        {
            FrameClass::System
        } else if any_prefix(type_name, &rules.adapter_type_prefixes)
            || rules.adapter_modules.iter().any(|m| *m == frame.module)
        {
            FrameClass::AdapterInternal
        } else {
            FrameClass::Candidate
        }
    }
}

/// The crate named by the first segment of `path`
pub(crate) fn crate_of(path: &str) -> &str {
    match path.find("::") {
        Some(idx) => &path[..idx],
        None => path,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn classify(type_name: &str) -> FrameClass {
        FrameClassifier::default().classify(&StackFrameInfo::new(type_name, "f"))
    }

    #[test]
    fn default_rules() {
        assert_eq!(classify("std::rt::lang_start"), FrameClass::System);
        assert_eq!(classify("core::ops::function::FnOnce"), FrameClass::System);
        assert_eq!(
            classify("backtrace::backtrace::libunwind"),
            FrameClass::System
        );
        assert_eq!(classify("tracing_core::event::Event"), FrameClass::System);
        assert_eq!(
            classify("tracing_subscriber::layer::layered::Layered<L,S>"),
            FrameClass::System
        );
        assert_eq!(classify("log::__private_api"), FrameClass::System);
        assert_eq!(
            classify("tracing_monitor::emitter::Sink<B>"),
            FrameClass::AdapterInternal
        );
        assert_eq!(classify("shop::checkout::Cart"), FrameClass::Candidate);
        // a prefix must match up to the separator
        assert_eq!(classify("stdlib_clone::thing"), FrameClass::Candidate);
        assert_eq!(classify("tracing_extra::thing"), FrameClass::Candidate);
    }

    #[test]
    fn prefixes_ignore_case() {
        assert_eq!(classify("STD::thread"), FrameClass::System);
        assert_eq!(classify("Tracing_Monitor::layer"), FrameClass::AdapterInternal);
    }

    #[test]
    fn modules() {
        let classifier = FrameClassifier::default();
        let frame = StackFrameInfo {
            method_name: Some("run_test".to_string()),
            module: "test".to_string(),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&frame), FrameClass::System);

        let frame = StackFrameInfo {
            method_name: Some("helper".to_string()),
            module: "tracing_monitor".to_string(),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&frame), FrameClass::AdapterInternal);

        // a frame with no type & an unknown module is fair game
        let frame = StackFrameInfo {
            method_name: Some("checkout".to_string()),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&frame), FrameClass::Candidate);
    }

    #[test]
    fn runtime_symbols() {
        let classifier = FrameClassifier::default();
        let pathless = |name: &str| StackFrameInfo {
            method_name: Some(name.to_string()),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&pathless("start_thread")), FrameClass::System);
        assert_eq!(classifier.classify(&pathless("__libc_start_main")), FrameClass::System);
        assert_eq!(classifier.classify(&pathless("_start")), FrameClass::System);
        assert_eq!(classifier.classify(&pathless("checkout")), FrameClass::Candidate);
        // a function with a path is never a runtime symbol
        assert_eq!(
            classifier.classify(&StackFrameInfo::new("shop", "main")),
            FrameClass::Candidate
        );
        assert_eq!(
            FrameClassifier::new(FrameRules::empty().system_symbol("checkout"))
                .classify(&pathless("checkout")),
            FrameClass::System
        );
    }

    #[test]
    fn system_wins_over_adapter() {
        let classifier =
            FrameClassifier::new(FrameRules::empty().system_type_prefix("shop::").adapter_module("shop"));
        assert_eq!(
            classifier.classify(&StackFrameInfo::new("shop::Cart", "total")),
            FrameClass::System
        );
    }

    #[test]
    fn custom_table() {
        let classifier = FrameClassifier::new(
            FrameRules::default()
                .front_end_type_prefix("slog::")
                .adapter_type_prefix("shop::logging::"),
        );
        assert_eq!(
            classifier.classify(&StackFrameInfo::new("slog::Logger", "log")),
            FrameClass::System
        );
        assert_eq!(
            classifier.classify(&StackFrameInfo::new("shop::logging::Audit", "record")),
            FrameClass::AdapterInternal
        );
        assert_eq!(
            classifier.classify(&StackFrameInfo::new("shop::Cart", "total")),
            FrameClass::Candidate
        );
        assert_eq!(
            FrameClassifier::new(FrameRules::empty())
                .classify(&StackFrameInfo::new("std::thread", "spawn")),
            FrameClass::Candidate
        );
    }

    #[test]
    fn crates() {
        assert_eq!(crate_of("shop::Cart"), "shop");
        assert_eq!(crate_of("shop"), "shop");
    }
}
