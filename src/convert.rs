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

//! Converting structured log records to journal field sets.
//!
//! This module is the heart of the crate: [`Converter`] takes one [`Record`] together with the
//! logger-bound attributes & open group path, and produces the journal's view of it-- a message,
//! a numeric [`Priority`], and a flat mapping of `[A-Z0-9_]+` field names to string values.
//!
//! The journal is picky about field names (uppercase ASCII, digits & underscores) and entirely
//! flat, while structured log attributes nest arbitrarily. The translation is therefore: flatten
//! the attribute tree joining nested keys with `_`, reject any flattened key containing a
//! character that cannot be fixed by upcasing, and namespace everything that survives with a
//! configurable prefix.
//!
//! Nothing in this module can fail: malformed field names are dropped, an unusable prefix is
//! replaced by [`DEFAULT_FIELD_PREFIX`], an unknown level maps to the most verbose priority. A
//! logging backend that aborts the log call is worse than one that degrades.

use crate::{
    attr::{nest_under, Attr, Value},
    priority::{Priority, PriorityMap},
    record::Record,
};

use std::collections::HashMap;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      the flat field map                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The flat field set handed to the journal; keys are prefixed, sanitized field names.
pub type FieldMap = HashMap<String, String>;

/// Group-aware attribute rewriter: receives the active group path & the attribute, returns the
/// replacement. Used for masking & redaction.
pub type ReplaceAttrFn = dyn Fn(&[String], Attr) -> Attr + Send + Sync;

/// The prefix applied to field names when none (or an invalid one) is configured.
pub const DEFAULT_FIELD_PREFIX: &str = "SLOG_";

/// Attribute names whose error values are decomposed into `ERROR`/`KIND`/`STACK` sub-fields by
/// default.
pub const DEFAULT_ERROR_KEYS: [&str; 2] = ["error", "err"];

/// The attribute name under which the call site is recorded by default.
pub const DEFAULT_SOURCE_KEY: &str = "source";

/// `<name>:<version>` of this crate; stamped into every entry under `<prefix>LOGGER`.
const IDENTITY: &str = concat!(env!("CARGO_PKG_NAME"), ":", env!("CARGO_PKG_VERSION"));

/// The result of converting one [`Record`].
#[derive(Clone, Debug)]
pub struct Conversion {
    pub message: String,
    pub priority: Priority,
    pub fields: FieldMap,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                              flattening, sanitization, prefixes                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Flatten an attribute tree into `(key, value)` pairs.
///
/// Depth-first, pre-order: a nested key is `parent_key + "_" + child_key`, with sequence elements
/// contributing their zero-based index as the key segment. Pairs come back in traversal order--
/// attribute sets are ordered, so the order is deterministic, and when two source paths flatten
/// to the same field name the caller's map retains the last-visited value.
///
/// There is no depth cap; the tree comes from span & event fields and is as shallow as the span
/// stack that produced it.
pub fn flatten(attrs: &[Attr]) -> Vec<(String, String)> {
    let mut flat = Vec::new();
    for attr in attrs {
        walk(&attr.key, &attr.value, &mut flat);
    }
    flat
}

fn walk(key: &str, value: &Value, flat: &mut Vec<(String, String)>) {
    match value {
        Value::Group(members) => {
            for member in members {
                walk(&join_key(key, &member.key), &member.value, flat);
            }
        }
        Value::Seq(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(&join_key(key, &i.to_string()), item, flat);
            }
        }
        leaf => flat.push((key.to_string(), leaf.render())),
    }
}

fn join_key(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}_{}", parent, child)
    }
}

/// Upcase a flattened key into a journal field name, or reject it.
///
/// All-or-nothing: one character outside `[A-Za-z0-9_]` anywhere in the key rejects the whole
/// key (and with it the field)-- the journal would refuse the entry otherwise, and a partially
/// rewritten name would be worse than a dropped one.
pub fn sanitize_key(raw: &str) -> Option<String> {
    let mut field = String::with_capacity(raw.len());
    for c in raw.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return None;
        }
        field.push(c.to_ascii_uppercase());
    }
    Some(field)
}

/// Resolve a raw, caller-supplied field prefix into the one actually applied.
///
/// A usable prefix starts with an uppercase ASCII letter and contains only `[A-Z0-9_]`; it gains
/// a trailing underscore. Anything else (including the empty string) resolves to
/// [`DEFAULT_FIELD_PREFIX`]. Pure: resolving the same raw value twice yields the same prefix and
/// mutates nothing.
pub fn resolve_field_prefix(raw: &str) -> String {
    if raw.is_empty() {
        return DEFAULT_FIELD_PREFIX.to_string();
    }
    if !raw.as_bytes()[0].is_ascii_uppercase() {
        return DEFAULT_FIELD_PREFIX.to_string();
    }
    for c in raw.bytes() {
        if !c.is_ascii_uppercase() && !c.is_ascii_digit() && c != b'_' {
            return DEFAULT_FIELD_PREFIX.to_string();
        }
    }
    format!("{}_", raw)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        the converter                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Convert a [`Record`] plus logger state into a journal entry's parts.
///
/// [`Converter`] is the stock implementation; this seam exists so an embedding application can
/// substitute its own end-to-end conversion while reusing the layer's capture & dispatch
/// machinery.
pub trait Convert {
    fn convert(
        &self,
        add_source: bool,
        replace_attr: Option<&ReplaceAttrFn>,
        logger_attrs: &[Attr],
        groups: &[String],
        record: &Record,
    ) -> Conversion;
}

/// The stock converter. All configuration is resolved & validated at construction
/// ([`Converter::builder`]); conversion itself shares no mutable state and may be called freely
/// from any number of threads.
pub struct Converter {
    prefix: String,
    priorities: PriorityMap,
    error_keys: Vec<String>,
    source_key: String,
}

impl std::default::Default for Converter {
    fn default() -> Self {
        Converter::builder().build()
    }
}

impl Converter {
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder {
            prefix: String::new(),
            priorities: PriorityMap::default(),
            error_keys: DEFAULT_ERROR_KEYS.iter().map(|s| s.to_string()).collect(),
            source_key: DEFAULT_SOURCE_KEY.to_string(),
        }
    }
    /// The resolved prefix applied to every field name (always ends in `_`).
    pub fn field_prefix(&self) -> &str {
        &self.prefix
    }
}

pub struct ConverterBuilder {
    prefix: String,
    priorities: PriorityMap,
    error_keys: Vec<String>,
    source_key: String,
}

impl ConverterBuilder {
    /// The raw field prefix; resolved per [`resolve_field_prefix`] when the converter is built.
    pub fn field_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
    pub fn priorities(mut self, priorities: PriorityMap) -> Self {
        self.priorities = priorities;
        self
    }
    /// The attribute names treated as error carriers.
    pub fn error_keys(mut self, keys: Vec<String>) -> Self {
        self.error_keys = keys;
        self
    }
    /// The attribute name under which the call site is recorded.
    pub fn source_key<S: Into<String>>(mut self, key: S) -> Self {
        self.source_key = key.into();
        self
    }
    pub fn build(self) -> Converter {
        Converter {
            prefix: resolve_field_prefix(&self.prefix),
            priorities: self.priorities,
            error_keys: self.error_keys,
            source_key: self.source_key,
        }
    }
}

impl Convert for Converter {
    fn convert(
        &self,
        add_source: bool,
        replace_attr: Option<&ReplaceAttrFn>,
        logger_attrs: &[Attr],
        groups: &[String],
        record: &Record,
    ) -> Conversion {
        // Aggregate: logger-bound attributes first (already nested under their group paths),
        // then the record's own attributes, nested under the full open group path.
        let mut attrs: Vec<Attr> = logger_attrs.to_vec();
        if !record.attrs.is_empty() {
            attrs.extend(nest_under(groups, record.attrs.clone()));
        }

        let mut attrs = replace_error_attrs(attrs, &self.error_keys);

        if add_source {
            if let Some(source) = record.source_attr(&self.source_key) {
                attrs.push(source);
            }
        }

        if let Some(f) = replace_attr {
            attrs = apply_replace(&mut Vec::new(), attrs, f);
        }

        let attrs = remove_empty(attrs);

        let mut fields = FieldMap::new();
        for (key, value) in flatten(&attrs) {
            if let Some(name) = sanitize_key(&key) {
                fields.insert(format!("{}{}", self.prefix, name), value);
            }
        }

        // Stamped after flattening so it can never be sanitized away or shadowed by an attribute.
        fields.insert(format!("{}LOGGER", self.prefix), IDENTITY.to_string());

        Conversion {
            message: record.message.clone(),
            priority: self.priorities.priority_for(&record.level.to_string()),
            fields,
        }
    }
}

/// Decompose error values held under error-carrier keys into `error`/`kind`/`stack` groups, at
/// any depth.
fn replace_error_attrs(attrs: Vec<Attr>, error_keys: &[String]) -> Vec<Attr> {
    attrs
        .into_iter()
        .map(|attr| match attr.value {
            Value::Group(members) => Attr {
                key: attr.key,
                value: Value::Group(replace_error_attrs(members, error_keys)),
            },
            Value::Error(err) if error_keys.iter().any(|k| *k == attr.key) => {
                let stack = err.stack.unwrap_or_else(|| "<nil>".to_string());
                Attr::group(
                    attr.key,
                    vec![
                        Attr::new("error", err.message),
                        Attr::new("kind", err.kind),
                        Attr::new("stack", stack),
                    ],
                )
            }
            _ => attr,
        })
        .collect()
}

/// Apply `f` to every leaf attribute, tracking the group path; groups themselves are recursed
/// into, not rewritten.
fn apply_replace(path: &mut Vec<String>, attrs: Vec<Attr>, f: &ReplaceAttrFn) -> Vec<Attr> {
    attrs
        .into_iter()
        .map(|attr| match attr.value {
            Value::Group(members) => {
                path.push(attr.key.clone());
                let members = apply_replace(path, members, f);
                path.pop();
                Attr {
                    key: attr.key,
                    value: Value::Group(members),
                }
            }
            _ => f(path, attr),
        })
        .collect()
}

/// Drop attributes with empty keys or empty values; groups are cleaned recursively & dropped if
/// nothing survives inside them.
fn remove_empty(attrs: Vec<Attr>) -> Vec<Attr> {
    attrs
        .into_iter()
        .filter_map(|attr| {
            if attr.key.is_empty() {
                return None;
            }
            match attr.value {
                Value::Group(members) => {
                    let members = remove_empty(members);
                    if members.is_empty() {
                        None
                    } else {
                        Some(Attr {
                            key: attr.key,
                            value: Value::Group(members),
                        })
                    }
                }
                value if value.is_empty() => None,
                value => Some(Attr {
                    key: attr.key,
                    value,
                }),
            }
        })
        .collect()
}
