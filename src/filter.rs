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

//! Level-based gating.

use crate::level::Level;

/// The sink's only gate: events below the configured level are dropped before any other work is
/// done on them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    minimum_level: Level,
}

impl EventFilter {
    pub fn new(minimum_level: Level) -> EventFilter {
        EventFilter { minimum_level }
    }
    pub fn minimum_level(&self) -> Level {
        self.minimum_level
    }
    pub fn accept(&self, level: Level) -> bool {
        level >= self.minimum_level
    }
}
