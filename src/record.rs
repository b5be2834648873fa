// Copyright (C) 2024-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of journal-tracing.
//
// journal-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! Capturing [`tracing`] [`Event`]s into [`Record`]s.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! A [`Record`] is the converter's view of one log call: the message, the verbosity level, the
//! call site (if the event's metadata carries one) and the call-site attributes. It is
//! deliberately an owned, framework-free value so that the converter can be exercised in tests
//! without standing up a subscriber.

use crate::attr::{Attr, ErrorValue, Value};

use tracing::field::{Field, Visit};

/// The call site recorded in an [`Event`]'s metadata.
///
/// [`tracing`] metadata carries no function name; the module path is the closest available datum
/// and stands in for it.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
#[derive(Clone, Debug, PartialEq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

impl SourceLocation {
    pub fn from_metadata(meta: &tracing::Metadata<'_>) -> SourceLocation {
        SourceLocation {
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            function: meta.module_path().map(|s| s.to_string()),
        }
    }
}

/// One structured log record, as handed to the converter.
#[derive(Clone, Debug)]
pub struct Record {
    /// The event's `message` field; empty if the event carried none.
    pub message: String,
    pub level: tracing::Level,
    pub source: Option<SourceLocation>,
    /// The call-site attributes (every event field other than `message`).
    pub attrs: Vec<Attr>,
}

impl Record {
    /// Capture `event` into an owned [`Record`].
    ///
    /// The metadata is passed separately rather than read off the event so that the caller may
    /// substitute normalized metadata for events bridged from the `log` crate.
    pub fn from_event(event: &tracing::Event<'_>, meta: &tracing::Metadata<'_>) -> Record {
        let mut visitor = AttrVisitor::default();
        event.record(&mut visitor);
        let (message, attrs) = visitor.finish();
        Record {
            message: message.unwrap_or_default(),
            level: *meta.level(),
            source: Some(SourceLocation::from_metadata(meta)),
            attrs,
        }
    }

    /// The call site as an attribute group named `key`, or `None` if no part of the location is
    /// known.
    pub(crate) fn source_attr(&self, key: &str) -> Option<Attr> {
        let source = self.source.as_ref()?;
        let mut parts = Vec::new();
        if let Some(file) = &source.file {
            parts.push(Attr::new("file", file.as_str()));
        }
        if let Some(line) = source.line {
            parts.push(Attr::new("line", u64::from(line)));
        }
        if let Some(function) = &source.function {
            parts.push(Attr::new("function", function.as_str()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(Attr::group(key, parts))
        }
    }
}

/// A [`Visit`] implementation that extracts the `message` field & collects every other field as
/// an [`Attr`].
///
/// Regrettably, the `message` field offers only a `Debug` implementation; but the tracing macros
/// `info!()`, `event!()` & the like all take care to "pre-format" it so that the value actually
/// refers to a `std::fmt::Arguments` instance, which will print to a debug format without
/// enclosing double-quotes.
#[derive(Default)]
pub(crate) struct AttrVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl AttrVisitor {
    pub(crate) fn finish(self) -> (Option<String>, Vec<Attr>) {
        (self.message, self.attrs)
    }
}

impl Visit for AttrVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr::new(field.name(), value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        // The concrete type is already erased here; from_dyn recovers it from a Labeled
        // wrapper when the call site used one.
        self.attrs
            .push(Attr::new(field.name(), Value::Error(ErrorValue::from_dyn(value))));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.attrs
                .push(Attr::new(field.name(), Value::Debug(format!("{:?}", value))));
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn source_attr_shape() {
        let record = Record {
            message: "M".to_string(),
            level: tracing::Level::INFO,
            source: Some(SourceLocation {
                file: Some("src/record.rs".to_string()),
                line: Some(42),
                function: Some("journal_tracing::record".to_string()),
            }),
            attrs: vec![],
        };
        let attr = record.source_attr("source").unwrap();
        assert_eq!(attr.key, "source");
        match attr.value {
            Value::Group(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0].key, "file");
                assert_eq!(parts[1].key, "line");
                assert_eq!(parts[1].value, Value::U64(42));
                assert_eq!(parts[2].key, "function");
            }
            _ => panic!("expected a group"),
        }
    }

    #[test]
    fn no_location_no_attr() {
        let record = Record {
            message: String::new(),
            level: tracing::Level::DEBUG,
            source: Some(SourceLocation {
                file: None,
                line: None,
                function: None,
            }),
            attrs: vec![],
        };
        assert!(record.source_attr("source").is_none());

        let record = Record { source: None, ..record };
        assert!(record.source_attr("source").is_none());
    }
}
