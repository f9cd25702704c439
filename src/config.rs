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

//! Sink configuration.
//!
//! [`SinkConfiguration`] is fixed when the sink is built & read (never written) by every emit
//! thereafter. Build one with [`SinkConfiguration::builder`], or deserialize one with [`serde`]
//! from whatever configuration format the application already uses:
//!
//! ```rust
//! use tracing_monitor::config::SinkConfiguration;
//! use tracing_monitor::level::Level;
//!
//! let config = SinkConfiguration::builder()
//!     .minimum_level(Level::Information)
//!     .category_property("LogCategory")
//!     .build();
//! assert_eq!(config.category_property.as_deref(), Some("LogCategory"));
//! assert!(config.include_call_location);
//! ```
//!
//! [`serde`]: https://docs.rs/serde

use crate::callsite::FrameRules;
use crate::level::Level;

use serde::{Deserialize, Serialize};

/// Configuration for the sink (independent of the backend's own configuration)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfiguration {
    /// Only forward events at this level or higher
    pub minimum_level: Level,
    /// The property to check for a category name, if any
    pub category_property: Option<String>,
    /// Attribute each event to the code that logged it
    pub include_call_location: bool,
    /// Render event properties into the record's detail
    pub render_properties: bool,
    /// End the backend session when the sink is dropped
    pub end_session_on_close: bool,
    /// When an event carries an error with a recorded stack, blame the code that raised the
    /// error rather than the code that logged it
    pub attribute_to_exception: bool,
    /// What counts as plumbing when attributing events
    pub frame_rules: FrameRules,
}

impl std::default::Default for SinkConfiguration {
    fn default() -> Self {
        SinkConfiguration {
            minimum_level: Level::Verbose,
            category_property: None,
            include_call_location: true,
            render_properties: true,
            end_session_on_close: false,
            attribute_to_exception: false,
            frame_rules: FrameRules::default(),
        }
    }
}

impl SinkConfiguration {
    pub fn builder() -> SinkConfigurationBuilder {
        SinkConfigurationBuilder {
            imp: SinkConfiguration::default(),
        }
    }
}

pub struct SinkConfigurationBuilder {
    imp: SinkConfiguration,
}

impl SinkConfigurationBuilder {
    pub fn minimum_level(mut self, level: Level) -> Self {
        self.imp.minimum_level = level;
        self
    }
    pub fn category_property<S: Into<String>>(mut self, name: S) -> Self {
        self.imp.category_property = Some(name.into());
        self
    }
    pub fn include_call_location(mut self, include: bool) -> Self {
        self.imp.include_call_location = include;
        self
    }
    pub fn render_properties(mut self, render: bool) -> Self {
        self.imp.render_properties = render;
        self
    }
    pub fn end_session_on_close(mut self, end: bool) -> Self {
        self.imp.end_session_on_close = end;
        self
    }
    pub fn attribute_to_exception(mut self, attribute: bool) -> Self {
        self.imp.attribute_to_exception = attribute;
        self
    }
    pub fn frame_rules(mut self, rules: FrameRules) -> Self {
        self.imp.frame_rules = rules;
        self
    }
    pub fn build(self) -> SinkConfiguration {
        self.imp
    }
}

/// Configuration for a backend session the sink will own.
///
/// Handing one of these to [`Sink::with_session`](crate::emitter::Sink::with_session) starts a
/// session & makes the sink responsible for ending it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub product: Option<String>,
    pub application: Option<String>,
    pub version: Option<String>,
}
