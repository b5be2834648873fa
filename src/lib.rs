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
//! A [`tracing-subscriber`] [`Layer`] implementation for sending [`tracing`] [`Event`]s to the
//! systemd [journal]
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/0.1.35/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [journal]: https://www.freedesktop.org/software/systemd/man/systemd-journald.service.html
//!
//! # Introduction
//!
//! The [`tracing`] crate is a "scoped, structured logging and diagnostics system". It makes a
//! very clear distinction between producers of events & their consumers ([`Subscriber`]s, in
//! [`tracing`] parlance); so much so that the [`tracing`] crate provides no support for
//! _consuming_ events, other than the definition of the [`Subscriber`] trait. The
//! [`tracing-subscriber`] crate adds the notion of a [`Layer`]: a modular implementation of one
//! specific behavior that can be "stacked" with others in a [`Subscriber`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Subscriber`]: https://docs.rs/tracing/0.1.34/tracing/trait.Subscriber.html
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/0.3.11/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/0.3.11/tracing_subscriber/layer/trait.Layer.html
//!
//! This crate provides a [`Layer`] implementation for dispatching [`tracing`] events to the
//! systemd journal. The journal wants a *flat* set of `[A-Z0-9_]+` field names & a numeric
//! priority, while [`tracing`] offers nested, freely named structure; the work of this crate is
//! that translation:
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/0.3.11/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! 1. capturing each [`Event`] (& the fields of the [`Span`]s around it) into an attribute tree
//!    ([`record`], [`attr`])
//!
//! 2. converting that tree into a flat, prefixed, sanitized field map & a journal priority
//!    ([`convert`], [`priority`])
//!
//! 3. encoding the result in the journal's native protocol ([`native`]) & handing it to a
//!    non-blocking dispatcher that owns the [`transport`]
//!
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html
//!
//! Step 3 never reports back: a full queue or an unreachable daemon costs entries (counted on
//! the [`Layer`](crate::layer::Layer)), never a blocked or failed log call. The same posture
//! runs through the converter-- a malformed field name is dropped, an invalid prefix replaced,
//! an unknown level mapped to the most verbose priority. A logging subsystem must never crash
//! or stall the application it serves.
//!
//! # Usage
//!
//! [journal-tracing](crate)'s [`Layer`](crate::layer::Layer) comes with sane defaults:
//!
//! ```no_run
//! use tracing::info;
//! use journal_tracing::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! // The default configuration converts events with the "SLOG_" field prefix
//! // and sends them to the journal daemon's well-known socket.
//! let subscriber = Registry::default().with(Layer::try_default().unwrap());
//!
//! info!("Hello, world!");
//! ```
//!
//! Will produce journal entries that look something like this:
//!
//! ```text
//! Jun 23 16:10:55 hostname appname[pid]: Hello, world!
//! ```
//!
//! with `journalctl -o verbose` showing the asserted fields:
//!
//! ```text
//! MESSAGE=Hello, world!
//! PRIORITY=6
//! SLOG_LOGGER=journal-tracing:0.1.0
//! ```
//!
//! That said, the field prefix, the level-to-priority mapping, attribute rewriting & the
//! transport are all configurable:
//!
//! ```no_run
//! use tracing::info;
//! use journal_tracing::convert::Converter;
//! use journal_tracing::layer::{Layer, LayerBuilder};
//! use journal_tracing::priority::{Priority, PriorityMap};
//! use journal_tracing::transport::JournalSocket;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let layer: Layer<Registry> = LayerBuilder::new()
//!     .level(tracing::Level::INFO)
//!     .add_source(true)
//!     .converter(
//!         Converter::builder()
//!             .field_prefix("ACME")
//!             .priorities(PriorityMap::default().with("WARN", Priority::LOG_ERR))
//!             .build(),
//!     )
//!     .layer(JournalSocket::try_default().unwrap());
//! let subscriber = Registry::default().with(layer);
//!
//! info!(uuid = "7d219626", "Hello, world!"); // journalctl will show ACME_UUID=7d219626
//! ```

pub mod attr;
pub mod convert;
pub mod error;
pub mod layer;
pub mod native;
pub mod priority;
pub mod record;
pub mod transport;
