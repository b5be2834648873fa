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

//! The structured-log attribute model.
//!
//! An [`Attr`] is one named, typed piece of structured data attached to a log call, a span, or a
//! context extractor. Values are modeled as an explicit sum type ([`Value`]) rather than trait
//! objects inspected at run-time: the set of variants is exactly the set of shapes the converter
//! knows how to flatten (scalars, pre-formatted debug text, error values, ordered groups and
//! ordered sequences).
//!
//! Groups nest: an attribute whose value is [`Value::Group`] contributes one level of nesting to
//! every attribute inside it, and the flattener joins the levels with underscores. Ordering is
//! significant throughout; attribute sets are `Vec`s, so traversal order is the stable insertion
//! order.

use backtrace::Backtrace;

/// A key paired with a [`Value`]; immutable once captured.
#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new<K: Into<String>, V: Into<Value>>(key: K, value: V) -> Attr {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }
    /// An attribute holding a nested group of attributes.
    pub fn group<K: Into<String>>(key: K, attrs: Vec<Attr>) -> Attr {
        Attr {
            key: key.into(),
            value: Value::Group(attrs),
        }
    }
    /// An attribute carrying an error value; the concrete type of `err` becomes the error's
    /// `kind` label.
    ///
    /// This is the directly-typed construction path. An error that has already crossed a
    /// `dyn Error` boundary (as every error captured out of a `tracing` event has) no longer
    /// knows its concrete type; see [`ErrorValue::from_dyn`] & [`Labeled`] for that case.
    pub fn error<K: Into<String>, E: std::error::Error>(key: K, err: &E) -> Attr {
        Attr {
            key: key.into(),
            value: Value::Error(ErrorValue::new(err)),
        }
    }
}

/// The value of an [`Attr`]: a scalar, a pre-formatted debug rendition, an error, or one level of
/// nesting (named children via [`Value::Group`], indexed children via [`Value::Seq`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    /// Text captured through a `Debug` implementation, already formatted.
    Debug(String),
    Error(ErrorValue),
    /// Named children; each member key is joined to the parent key on flattening.
    Group(Vec<Attr>),
    /// Indexed children; the zero-based position is the key segment on flattening.
    Seq(Vec<Value>),
}

impl Value {
    /// True for values the converter removes from the attribute set: empty text, empty groups &
    /// empty sequences.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Str(s) | Value::Debug(s) => s.is_empty(),
            Value::Group(attrs) => attrs.is_empty(),
            Value::Seq(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Stringify a leaf value for the flat field map.
    ///
    /// [`Value::Debug`] is already formatted; error values render as their message. Group &
    /// sequence values are never leaves (the flattener recurses into them), so their rendition
    /// here is just the derived debug text.
    pub(crate) fn render(&self) -> String {
        match self {
            Value::Str(s) | Value::Debug(s) => s.clone(),
            Value::I64(n) => n.to_string(),
            Value::U64(n) => n.to_string(),
            Value::F64(x) => x.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Error(e) => e.message.clone(),
            Value::Group(attrs) => format!("{:?}", attrs),
            Value::Seq(items) => format!("{:?}", items),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::I64(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Value {
        Value::U64(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::F64(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

/// An error captured into the attribute set.
///
/// The `kind` label must be fixed while the concrete type is still in view: [`ErrorValue::new`]
/// takes the error fully typed, and [`ErrorValue::from_dyn`] handles the shape `tracing` hands
/// to visitors, where only a [`Labeled`] wrapper (recovered by downcast) can still name the
/// type. A stack is attached only on request ([`ErrorValue::with_stack`]); the converter
/// substitutes the literal `"<nil>"` when it is absent.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub message: String,
    pub kind: String,
    pub stack: Option<String>,
}

impl ErrorValue {
    /// Capture a concretely-typed error; `E`'s type name becomes the `kind` label.
    pub fn new<E: std::error::Error>(err: &E) -> ErrorValue {
        ErrorValue {
            message: err.to_string(),
            kind: std::any::type_name::<E>().to_string(),
            stack: None,
        }
    }
    /// Capture an error that has already been type-erased.
    ///
    /// By the time a `tracing` visitor sees an error-valued field it is a bare
    /// `&(dyn Error + 'static)`; the concrete type name is unrecoverable from that alone. A
    /// [`Labeled`] wrapper smuggles the name (& an optional stack) across the boundary and is
    /// unwrapped here; any other error keeps its message but degrades to the trait-object
    /// label.
    pub fn from_dyn(err: &(dyn std::error::Error + 'static)) -> ErrorValue {
        match err.downcast_ref::<Labeled>() {
            Some(labeled) => ErrorValue {
                message: labeled.message.clone(),
                kind: labeled.kind.to_string(),
                stack: labeled.stack.clone(),
            },
            None => ErrorValue {
                message: err.to_string(),
                kind: std::any::type_name_of_val(err).to_string(),
                stack: None,
            },
        }
    }
    /// Capture the current call stack into the error value.
    pub fn with_stack(mut self) -> ErrorValue {
        self.stack = Some(format!("{:?}", Backtrace::new()));
        self
    }
}

/// An error wrapper that carries its concrete type name across `dyn Error` boundaries.
///
/// `tracing` accepts error-valued fields only as `&(dyn Error + 'static)`, so the concrete type
/// is erased before this crate's visitor ever runs. Wrap the error at the call site and the
/// converter's `KIND` sub-field keeps the real name:
///
/// ```rust
/// use journal_tracing::attr::Labeled;
/// use std::error::Error;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
/// tracing::error!(error = &Labeled::new(&err) as &(dyn Error + 'static), "disk trouble");
/// ```
#[derive(Clone, Debug)]
pub struct Labeled {
    message: String,
    kind: &'static str,
    stack: Option<String>,
}

impl Labeled {
    pub fn new<E: std::error::Error>(err: &E) -> Labeled {
        Labeled {
            message: err.to_string(),
            kind: std::any::type_name::<E>(),
            stack: None,
        }
    }
    /// Capture the current call stack alongside the error.
    pub fn with_stack(mut self) -> Labeled {
        self.stack = Some(format!("{:?}", Backtrace::new()));
        self
    }
}

impl std::fmt::Display for Labeled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Labeled {}

/// Wrap `attrs` in one group per element of `path`, outermost first, yielding attributes that sit
/// at the root of an attribute set. An empty path returns `attrs` unchanged.
pub fn nest_under(path: &[String], attrs: Vec<Attr>) -> Vec<Attr> {
    path.iter()
        .rev()
        .fold(attrs, |acc, group| vec![Attr::group(group.clone(), acc)])
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn emptiness() {
        assert!(Value::Str(String::new()).is_empty());
        assert!(Value::Group(vec![]).is_empty());
        assert!(Value::Seq(vec![]).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::I64(0).is_empty());
        assert!(!Value::Str("x".to_string()).is_empty());
    }

    #[test]
    fn error_values() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let val = ErrorValue::new(&err);
        assert_eq!(val.message, "boom");
        assert_eq!(val.kind, std::any::type_name::<std::io::Error>());
        assert!(val.stack.is_none());
        assert!(val.with_stack().stack.is_some());
    }

    #[test]
    fn labeled_errors_survive_erasure() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let labeled = Labeled::new(&err);
        let erased: &(dyn std::error::Error + 'static) = &labeled;
        let val = ErrorValue::from_dyn(erased);
        assert_eq!(val.message, "boom");
        assert_eq!(val.kind, std::any::type_name::<std::io::Error>());
        assert!(val.stack.is_none());

        let labeled = Labeled::new(&err).with_stack();
        let erased: &(dyn std::error::Error + 'static) = &labeled;
        assert!(ErrorValue::from_dyn(erased).stack.is_some());
    }

    #[test]
    fn unlabeled_errors_degrade_to_the_trait_object_label() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let erased: &(dyn std::error::Error + 'static) = &err;
        let val = ErrorValue::from_dyn(erased);
        assert_eq!(val.message, "boom");
        assert_ne!(val.kind, std::any::type_name::<std::io::Error>());
        assert!(val.kind.contains("Error"));
    }

    #[test]
    fn nesting() {
        let path = vec!["a".to_string(), "b".to_string()];
        let nested = nest_under(&path, vec![Attr::new("x", 1_i64)]);
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].key, "a");
        match &nested[0].value {
            Value::Group(inner) => {
                assert_eq!(inner.len(), 1);
                assert_eq!(inner[0].key, "b");
            }
            _ => panic!("expected a group"),
        }
    }
}
