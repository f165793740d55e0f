//! Span observer
//!
//! Instrumentation is explicit: call sites start a [`SpanTimer`] and finish
//! it with an outcome, and the injected [`SpanObserver`] receives both ends.

use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanOutcome {
    Ok,
    Skipped,
    Error,
}

/// Receives timing for internal operations (scan, update, reload, batch).
pub trait SpanObserver: Send + Sync {
    fn on_span_start(&self, _name: &str) {}

    fn on_span_end(&self, name: &str, duration: Duration, outcome: SpanOutcome);
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SpanObserver for NoopObserver {
    fn on_span_end(&self, _name: &str, _duration: Duration, _outcome: SpanOutcome) {}
}

/// Observer that reports spans as `debug` tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SpanObserver for TracingObserver {
    fn on_span_start(&self, name: &str) {
        debug!(span = name, "span started");
    }

    fn on_span_end(&self, name: &str, duration: Duration, outcome: SpanOutcome) {
        debug!(span = name, ?duration, ?outcome, "span finished");
    }
}

/// Running span. Dropping it without [`finish`](SpanTimer::finish) reports nothing.
pub struct SpanTimer<'a> {
    observer: &'a dyn SpanObserver,
    name: String,
    started: Instant,
}

impl<'a> SpanTimer<'a> {
    pub fn start(observer: &'a dyn SpanObserver, name: impl Into<String>) -> Self {
        let name = name.into();
        observer.on_span_start(&name);
        Self {
            observer,
            name,
            started: Instant::now(),
        }
    }

    pub fn finish(self, outcome: SpanOutcome) -> Duration {
        let duration = self.started.elapsed();
        self.observer.on_span_end(&self.name, duration, outcome);
        duration
    }
}
