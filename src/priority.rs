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

//! journal priority definitions.
//!
//! The journal stores each entry's severity in its `PRIORITY` field, on the eight-value scale
//! syslog has used since time immemorial; [`Priority`] replicates the names used in `<syslog.h>`
//! (lower is more severe). [`PriorityMap`] maps the canonical names of [`tracing`] verbosity
//! levels onto that scale, and is the one piece of the translation an embedding application will
//! most often want to override (to promote, say, `WARN` to `LOG_ERR` on a particular host).
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html

use std::collections::HashMap;

type StdResult<T, E> = std::result::Result<T, E>;

/// The eight severities the journal understands, `<syslog.h>` names & values.
///
/// Note the inversion relative to [`tracing`]: here the numerically *smallest* value is the most
/// severe, and `LOG_DEBUG` (7) is the most verbose.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Priority {
    /// system is unusable
    LOG_EMERG = 0,
    /// action must be take immediately
    LOG_ALERT = 1,
    /// critical conditions
    LOG_CRIT = 2,
    /// error conditions
    LOG_ERR = 3,
    /// warning conditions
    LOG_WARNING = 4,
    /// normal, but significant condition
    LOG_NOTICE = 5,
    /// informational message
    LOG_INFO = 6,
    /// debug-level message
    LOG_DEBUG = 7,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Priority::LOG_EMERG => "LOG_EMERG",
                Priority::LOG_ALERT => "LOG_ALERT",
                Priority::LOG_CRIT => "LOG_CRIT",
                Priority::LOG_ERR => "LOG_ERR",
                Priority::LOG_WARNING => "LOG_WARNING",
                Priority::LOG_NOTICE => "LOG_NOTICE",
                Priority::LOG_INFO => "LOG_INFO",
                Priority::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

/// A mapping from level name (the `Display` form of a [`tracing::Level`], e.g. `"INFO"`) to
/// journal [`Priority`].
///
/// A level name with no entry resolves to [`Priority::LOG_DEBUG`], the most verbose priority;
/// an incomplete or empty map degrades the translation, it never fails it.
#[derive(Clone, Debug)]
pub struct PriorityMap(HashMap<String, Priority>);

impl std::default::Default for PriorityMap {
    fn default() -> Self {
        PriorityMap::empty()
            .with("TRACE", Priority::LOG_DEBUG)
            .with("DEBUG", Priority::LOG_DEBUG)
            .with("INFO", Priority::LOG_INFO)
            .with("WARN", Priority::LOG_WARNING)
            .with("ERROR", Priority::LOG_ERR)
    }
}

impl PriorityMap {
    /// A map with no entries; every lookup falls back to [`Priority::LOG_DEBUG`].
    pub fn empty() -> PriorityMap {
        PriorityMap(HashMap::new())
    }
    /// Add or replace one entry.
    pub fn with<L: Into<String>>(mut self, level: L, priority: Priority) -> PriorityMap {
        self.0.insert(level.into(), priority);
        self
    }
    /// Resolve a level name; unknown names yield the most verbose priority.
    pub fn priority_for(&self, level: &str) -> Priority {
        self.0.get(level).copied().unwrap_or(Priority::LOG_DEBUG)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn numeric_values() {
        assert_eq!(Priority::LOG_EMERG as u8, 0);
        assert_eq!(Priority::LOG_ERR as u8, 3);
        assert_eq!(Priority::LOG_INFO as u8, 6);
        assert_eq!(Priority::LOG_DEBUG as u8, 7);
        assert_eq!(format!("{}", Priority::LOG_WARNING), "LOG_WARNING");
    }

    #[test]
    fn default_mapping() {
        let map = PriorityMap::default();
        assert_eq!(map.priority_for("TRACE"), Priority::LOG_DEBUG);
        assert_eq!(map.priority_for("DEBUG"), Priority::LOG_DEBUG);
        assert_eq!(map.priority_for("INFO"), Priority::LOG_INFO);
        assert_eq!(map.priority_for("WARN"), Priority::LOG_WARNING);
        assert_eq!(map.priority_for("ERROR"), Priority::LOG_ERR);
    }

    #[test]
    fn unknown_levels_fall_back_to_most_verbose() {
        assert_eq!(
            PriorityMap::empty().priority_for("INFO"),
            Priority::LOG_DEBUG
        );
        assert_eq!(
            PriorityMap::default().priority_for("DEBUG-4"),
            Priority::LOG_DEBUG
        );
    }

    #[test]
    fn overriding() {
        let map = PriorityMap::default().with("WARN", Priority::LOG_NOTICE);
        assert_eq!(map.priority_for("WARN"), Priority::LOG_NOTICE);
        assert_eq!(map.priority_for("ERROR"), Priority::LOG_ERR);
    }
}
