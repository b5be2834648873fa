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

//! [journal-tracing](crate) [`Layer`] implementations.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! [`Layer`](struct@Layer) observes [`tracing`] events, converts each into a journal entry via a
//! [`Convert`] implementation, encodes it in the native protocol & enqueues it on a bounded
//! channel drained by one background thread that owns the [`Transport`]. The log call never
//! waits on, and never learns the fate of, the transmission: a full queue drops the entry (and
//! bumps [`Layer::dropped`]), a transport failure is discarded by the worker (and bumps
//! [`Layer::failed`]). Logging must never be allowed to crash or block the application.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! Spans map onto the journal's flat field space as nested groups: each span in scope contributes
//! a group named after it holding that span's fields, and the event's own fields sit inside the
//! innermost group. So `info_span!("request", id = 7)` around `info!(uuid = "X", "hi")` yields
//! `SLOG_REQUEST_ID=7` & `SLOG_REQUEST_UUID=X`.

use crate::{
    attr::{nest_under, Attr},
    convert::{Convert, Converter, ReplaceAttrFn},
    error::Result,
    native,
    record::{AttrVisitor, Record},
    transport::Transport,
};

#[cfg(unix)]
use crate::transport::JournalSocket;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::Event;
use tracing_core::span;
use tracing_subscriber::layer::Context;

use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

// When the tracing-log feature is enabled, use NormalizeEvent to extract file/line metadata
// from events that originated from the `log` crate. This follows the same pattern used by
// tracing-subscriber's fmt layer.
// See: https://github.com/tokio-rs/tracing/blob/master/tracing-subscriber/src/fmt/fmt_layer.rs
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// A context-attribute extractor: invoked on every event, its output joins the attribute set at
/// the root (after logger-bound attributes, before the event's own).
pub type ContextAttrFn = dyn Fn() -> Vec<Attr> + Send + Sync;

/// Queue depth used when the builder is not told otherwise.
const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Span fields captured at creation, stashed in the span's extensions until an event needs them.
struct SpanFields(Vec<Attr>);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Layer                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s to the
/// systemd journal.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer<S, C: Convert = Converter> {
    converter: C,
    level: tracing::Level,
    add_source: bool,
    replace_attr: Option<Arc<ReplaceAttrFn>>,
    attrs_from_context: Vec<Arc<ContextAttrFn>>,
    tx: Sender<Vec<u8>>,
    /// Entries dropped because the queue was full.
    pub dropped: Arc<AtomicU64>,
    /// Entries the worker failed to transmit.
    pub failed: Arc<AtomicU64>,
    // I need the Subscriber implementation type as a type parameter to transmit it to the
    // Layer trait implementation. 👇 gets the compiler to shut-up about unused type parameters.
    subscriber_type: PhantomData<S>,
}

#[cfg(unix)]
impl<S> Layer<S, Converter> {
    /// Attempt to construct a [`Layer`] that will send entries to the journal daemon at its
    /// well-known socket, with the stock converter & its defaults.
    pub fn try_default() -> Result<Self> {
        Ok(LayerBuilder::new().layer(JournalSocket::try_default()?))
    }
}

impl<S> Layer<S, Converter> {
    /// Construct a [`Layer`] with the stock converter & its defaults, over transport `transport`.
    pub fn with_transport<T: Transport + Send + 'static>(transport: T) -> Self {
        LayerBuilder::new().layer(transport)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       struct LayerBuilder                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct LayerBuilder {
    level: tracing::Level,
    add_source: bool,
    replace_attr: Option<Arc<ReplaceAttrFn>>,
    attrs_from_context: Vec<Arc<ContextAttrFn>>,
    converter: Converter,
    queue_depth: usize,
}

impl std::default::Default for LayerBuilder {
    fn default() -> Self {
        LayerBuilder::new()
    }
}

impl LayerBuilder {
    pub fn new() -> LayerBuilder {
        LayerBuilder {
            level: tracing::Level::TRACE,
            add_source: false,
            replace_attr: None,
            attrs_from_context: Vec::new(),
            converter: Converter::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
    /// The most verbose level forwarded to the journal (default: everything).
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }
    /// Record the call site under the converter's source key.
    pub fn add_source(mut self, add_source: bool) -> Self {
        self.add_source = add_source;
        self
    }
    /// Rewrite attributes before conversion; receives the active group path & the attribute.
    /// Meant for masking & redaction.
    pub fn replace_attr<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String], Attr) -> Attr + Send + Sync + 'static,
    {
        self.replace_attr = Some(Arc::new(f));
        self
    }
    /// Register an extractor contributing attributes from ambient state (task-locals, request
    /// context & the like) to every entry. May be called repeatedly; extractors run in
    /// registration order.
    pub fn attrs_from_context<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<Attr> + Send + Sync + 'static,
    {
        self.attrs_from_context.push(Arc::new(f));
        self
    }
    /// Replace the stock converter's configuration (field prefix, priority map, error carriers,
    /// source key).
    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }
    /// Capacity of the dispatch queue; entries beyond it are dropped, not awaited. A minimal
    /// threshold is enforced to avoid degenerate configurations.
    pub fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(16);
        self
    }
    /// Construct the [`Layer`], spawning its dispatch worker around `transport`.
    pub fn layer<S, T: Transport + Send + 'static>(self, transport: T) -> Layer<S, Converter> {
        let LayerBuilder {
            level,
            add_source,
            replace_attr,
            attrs_from_context,
            converter,
            queue_depth,
        } = self;
        assemble(
            converter,
            level,
            add_source,
            replace_attr,
            attrs_from_context,
            queue_depth,
            transport,
        )
    }
    /// Construct the [`Layer`] around a custom [`Convert`] implementation.
    pub fn layer_with_converter<S, C, T>(self, converter: C, transport: T) -> Layer<S, C>
    where
        C: Convert,
        T: Transport + Send + 'static,
    {
        assemble(
            converter,
            self.level,
            self.add_source,
            self.replace_attr,
            self.attrs_from_context,
            self.queue_depth,
            transport,
        )
    }
}

fn assemble<S, C, T>(
    converter: C,
    level: tracing::Level,
    add_source: bool,
    replace_attr: Option<Arc<ReplaceAttrFn>>,
    attrs_from_context: Vec<Arc<ContextAttrFn>>,
    queue_depth: usize,
    transport: T,
) -> Layer<S, C>
where
    C: Convert,
    T: Transport + Send + 'static,
{
    let (tx, rx) = bounded(queue_depth);
    let failed = Arc::new(AtomicU64::new(0));
    spawn_worker(transport, rx, Arc::clone(&failed));
    Layer {
        converter,
        level,
        add_source,
        replace_attr,
        attrs_from_context,
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
        failed,
        subscriber_type: PhantomData,
    }
}

/// Drain the queue until every sender is gone; entries already queued at teardown still go out.
fn spawn_worker<T: Transport + Send + 'static>(
    transport: T,
    rx: Receiver<Vec<u8>>,
    failed: Arc<AtomicU64>,
) {
    std::thread::spawn(move || {
        for buf in rx.iter() {
            // Fire-and-forget: a failed send is counted & discarded, never retried.
            if transport.send(&buf).is_err() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
}

/// This is the Big Tuna-- the [`Layer`] implementation.
///
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
impl<S, C> tracing_subscriber::layer::Layer<S> for Layer<S, C>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    C: Convert + 'static,
{
    fn enabled(
        &self,
        metadata: &tracing::Metadata<'_>,
        _ctx: Context<'_, S>,
    ) -> bool {
        // Gate events only; spans stay visible so their fields can be captured for whatever
        // events do pass.
        !metadata.is_event() || *metadata.level() <= self.level
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        let mut visitor = AttrVisitor::default();
        attrs.record(&mut visitor);
        let (message, mut fields) = visitor.finish();
        if let Some(message) = message {
            // A span field that happens to be named "message" is just another attribute.
            fields.push(Attr::new("message", message));
        }
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        let mut visitor = AttrVisitor::default();
        values.record(&mut visitor);
        let (message, mut fields) = visitor.finish();
        if let Some(message) = message {
            fields.push(Attr::new("message", message));
        }
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(existing) => existing.0.extend(fields),
            None => extensions.insert(SpanFields(fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // When the tracing-log feature is enabled, use normalized_metadata() to get
        // file/line info for events that originated from the `log` crate.
        // For native tracing events, normalized_metadata() returns None and we use
        // the event's own metadata.
        // See: https://github.com/tokio-rs/tracing/blob/9978c3663bcd58de14b3cf089ad24cb63d00a922/tracing-subscriber/src/fmt/format/pretty.rs#L182
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        // Logger-bound attributes: each span in scope contributes its fields, nested under the
        // group path down to & including that span. The open group path is the span names, root
        // to leaf.
        let mut logger_attrs: Vec<Attr> = Vec::new();
        let mut groups: Vec<String> = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                groups.push(span.name().to_string());
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<SpanFields>() {
                    if !fields.0.is_empty() {
                        logger_attrs.extend(nest_under(&groups, fields.0.clone()));
                    }
                }
            }
        }
        for extract in &self.attrs_from_context {
            logger_attrs.extend(extract());
        }

        let record = Record::from_event(event, meta);
        let conversion = self.converter.convert(
            self.add_source,
            self.replace_attr.as_deref(),
            &logger_attrs,
            &groups,
            &record,
        );

        match self.tx.try_send(native::encode_entry(&conversion)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Shutting down; nothing useful to record.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod smoke {

    use super::*;
    use crate::{
        attr::{Labeled, Value},
        convert::Conversion,
        priority::PriorityMap,
    };

    use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

    use std::collections::HashMap;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Hands every payload to the test over a channel, standing in for the journal daemon.
    struct ChannelTransport(crossbeam_channel::Sender<Vec<u8>>);

    impl Transport for ChannelTransport {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            let _ = self.0.send(buf.to_vec());
            Ok(buf.len())
        }
    }

    fn capture() -> (ChannelTransport, crossbeam_channel::Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelTransport(tx), rx)
    }

    fn next_entry(rx: &crossbeam_channel::Receiver<Vec<u8>>) -> HashMap<String, String> {
        native::decode_entry(&rx.recv_timeout(TIMEOUT).unwrap())
    }

    #[test]
    fn basic_event() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(uuid = "X", "M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["MESSAGE"], "M");
        assert_eq!(fields["PRIORITY"], "6");
        assert_eq!(fields["SLOG_UUID"], "X");
        assert_eq!(
            fields["SLOG_LOGGER"],
            concat!(env!("CARGO_PKG_NAME"), ":", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn messageless_event() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(uuid = "X");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["MESSAGE"], "");
        assert_eq!(fields["SLOG_UUID"], "X");
    }

    #[test]
    fn spans_become_groups() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let outer = tracing::info_span!("request", id = 7);
            let _outer = outer.enter();
            let inner = tracing::info_span!("db", table = "users");
            let _inner = inner.enter();
            tracing::info!(uuid = "X", "M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["SLOG_REQUEST_ID"], "7");
        assert_eq!(fields["SLOG_REQUEST_DB_TABLE"], "users");
        assert_eq!(fields["SLOG_REQUEST_DB_UUID"], "X");
        assert!(!fields.contains_key("SLOG_UUID"));
    }

    #[test]
    fn error_fields_decompose_through_capture() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
            tracing::error!(
                error = &Labeled::new(&err) as &(dyn std::error::Error + 'static),
                "M"
            );
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["MESSAGE"], "M");
        assert_eq!(fields["PRIORITY"], "3");
        assert_eq!(fields["SLOG_ERROR_ERROR"], "boom");
        assert_eq!(
            fields["SLOG_ERROR_KIND"],
            std::any::type_name::<std::io::Error>()
        );
        assert_eq!(fields["SLOG_ERROR_STACK"], "<nil>");
    }

    #[test]
    fn unlabeled_error_fields_still_decompose() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
            tracing::error!(error = &err as &(dyn std::error::Error + 'static), "M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["SLOG_ERROR_ERROR"], "boom");
        // Without a Labeled wrapper the concrete type was erased before capture; the kind
        // degrades to the trait-object label.
        assert_ne!(
            fields["SLOG_ERROR_KIND"],
            std::any::type_name::<std::io::Error>()
        );
        assert!(fields["SLOG_ERROR_KIND"].contains("Error"));
        assert_eq!(fields["SLOG_ERROR_STACK"], "<nil>");
    }

    #[test]
    fn level_gate() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new()
            .level(tracing::Level::INFO)
            .layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("quiet");
            tracing::info!("loud");
        });

        // The queue is FIFO, so had the debug event been forwarded it would have arrived first.
        let fields = next_entry(&rx);
        assert_eq!(fields["MESSAGE"], "loud");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn source_location() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new().add_source(true).layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("M");
        });

        let fields = next_entry(&rx);
        assert!(fields["SLOG_SOURCE_FILE"].ends_with("layer.rs"));
        assert!(fields["SLOG_SOURCE_LINE"].parse::<u32>().is_ok());
        assert!(fields["SLOG_SOURCE_FUNCTION"].contains("journal_tracing"));
    }

    #[test]
    fn context_extractors() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new()
            .attrs_from_context(|| vec![Attr::new("tenant", "acme")])
            .layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["SLOG_TENANT"], "acme");
    }

    #[test]
    fn replace_attr_redacts() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new()
            .replace_attr(|_groups, mut attr| {
                if attr.key == "password" {
                    attr.value = Value::Str("*****".to_string());
                }
                attr
            })
            .layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(password = "hunter2", "M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["SLOG_PASSWORD"], "*****");
    }

    #[test]
    fn custom_converter_configuration() {
        let (transport, rx) = capture();
        let layer: Layer<Registry> = LayerBuilder::new()
            .converter(
                Converter::builder()
                    .field_prefix("CUSTOM")
                    .priorities(PriorityMap::default().with("INFO", crate::priority::Priority::LOG_NOTICE))
                    .build(),
            )
            .layer(transport);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(uuid = "X", "M");
        });

        let fields = next_entry(&rx);
        assert_eq!(fields["CUSTOM_UUID"], "X");
        assert_eq!(fields["PRIORITY"], "5");
        assert!(!fields.contains_key("SLOG_UUID"));
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        // A transport that never completes a send: the worker wedges on the first entry & the
        // queue fills behind it.
        struct WedgedTransport(crossbeam_channel::Receiver<()>);
        impl Transport for WedgedTransport {
            fn send(&self, buf: &[u8]) -> Result<usize> {
                let _ = self.0.recv();
                Ok(buf.len())
            }
        }

        let (_hold, hold_rx) = crossbeam_channel::bounded::<()>(0);
        let layer: Layer<Registry> = LayerBuilder::new()
            .queue_depth(16)
            .layer(WedgedTransport(hold_rx));
        let dropped = Arc::clone(&layer.dropped);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..100_u32 {
                tracing::info!(i, "spam");
            }
        });

        // Capacity 16, plus at most one entry in the worker's hands: at least 83 must have been
        // dropped, & the loop above completed without blocking.
        assert!(dropped.load(Ordering::Relaxed) >= 83);
    }

    #[test]
    fn delivery_failures_are_counted_not_surfaced() {
        struct FailingTransport;
        impl Transport for FailingTransport {
            fn send(&self, _buf: &[u8]) -> Result<usize> {
                Err(crate::error::Error::Transport {
                    source: "the daemon is on strike".into(),
                    back: backtrace::Backtrace::new(),
                })
            }
        }

        let layer: Layer<Registry> = LayerBuilder::new().layer(FailingTransport);
        let failed = Arc::clone(&layer.failed);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("M");
        });

        // The layer (& with it the queue's sender) is gone; the worker has drained the queue.
        let deadline = std::time::Instant::now() + TIMEOUT;
        while failed.load(Ordering::Relaxed) == 0 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn encode_convert_round_trip() {
        // The conversion that feeds the wire encoder is the stock one; spot-check the seam.
        let conversion = Conversion {
            message: "M".to_string(),
            priority: crate::priority::Priority::LOG_INFO,
            fields: HashMap::from([("SLOG_UUID".to_string(), "X".to_string())]),
        };
        let fields = native::decode_entry(&native::encode_entry(&conversion));
        assert_eq!(fields["PRIORITY"], "6");
        assert_eq!(fields["MESSAGE"], "M");
        assert_eq!(fields["SLOG_UUID"], "X");
    }
}
