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

//! Rendering message templates.
//!
//! A template is text with `{Name}` holes that are filled in from the event's properties. A hole
//! may carry a leading `@` (render the value structurally) or `$` (render it as a string), and a
//! trailing `,N` alignment (pad to N columns; negative N pads on the right) or `:format`. String
//! values render quoted unless the format is `l`. `{{` & `}}` are literal braces; any hole that
//! doesn't parse, or that names a property the event doesn't carry, is reproduced verbatim.

use crate::category::literal_text;
use crate::event::LogEvent;

use serde_json::Value;

/// Turns a [`LogEvent`] into the message text the backend records.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, event: &LogEvent) -> String;
}

/// The default [`MessageRenderer`]
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateRenderer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hint {
    None,
    Destructure,
    Stringify,
}

#[derive(Debug, PartialEq, Eq)]
struct Hole<'a> {
    name: &'a str,
    hint: Hint,
    alignment: Option<i32>,
    format: Option<&'a str>,
}

fn is_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Parse the inside of a `{...}`
fn parse_hole(text: &str) -> Option<Hole<'_>> {
    let (hint, rest) = match text.as_bytes().first() {
        Some(b'@') => (Hint::Destructure, &text[1..]),
        Some(b'$') => (Hint::Stringify, &text[1..]),
        _ => (Hint::None, text),
    };
    let (rest, format) = match rest.find(':') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };
    let (name, alignment) = match rest.find(',') {
        Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim().parse::<i32>().ok()?)),
        None => (rest, None),
    };
    if !is_name(name) {
        return None;
    }
    Some(Hole {
        name,
        hint,
        alignment,
        format,
    })
}

fn render_value(value: &Value, hole: &Hole<'_>) -> String {
    let literal = hole.format.map_or(false, |f| f == "l");
    match (hole.hint, value) {
        (Hint::Stringify, _) if literal => literal_text(value),
        (Hint::Stringify, _) => Value::from(literal_text(value)).to_string(),
        (_, Value::String(s)) if literal => s.clone(),
        (_, value) => value.to_string(),
    }
}

fn align(text: String, alignment: Option<i32>) -> String {
    let width = match alignment {
        Some(n) => n.unsigned_abs() as usize,
        None => return text,
    };
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let pad = " ".repeat(width - len);
    match alignment {
        Some(n) if n < 0 => text + &pad,
        _ => pad + &text,
    }
}

impl TemplateRenderer {
    /// Render `template` against `lookup`
    pub fn render_with<'a, F>(&self, template: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(idx) = rest.find(|c: char| c == '{' || c == '}') {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx..];
            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                out.push('}');
                rest = &tail[1..];
                continue;
            }
            let close = match tail.find('}') {
                Some(close) => close,
                None => {
                    out.push_str(tail);
                    return out;
                }
            };
            let token = &tail[..=close];
            let rendered = parse_hole(&token[1..close]).and_then(|hole| {
                lookup(hole.name).map(|value| align(render_value(value, &hole), hole.alignment))
            });
            match rendered {
                Some(text) => out.push_str(&text),
                None => out.push_str(token),
            }
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

impl MessageRenderer for TemplateRenderer {
    fn render(&self, event: &LogEvent) -> String {
        self.render_with(event.template(), |name| event.property(name))
    }
}
