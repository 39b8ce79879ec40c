//! Call trace and report output
//!
//! Every line goes to the injected [`LogSink`], prefixed with the seconds
//! elapsed since the log was created:
//!
//! ```text
//! [12.345678] cube: glDrawArrays(GL_TRIANGLES, 0, 36) -> ()
//! ```
//!
//! Trace lines honour the sink's pause gate and the family's
//! [`TraceWindow`]; report lines are always written.

use crate::platform::{Clock, LogSink};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Timestamped writer on top of a [`LogSink`]
pub struct TraceLog {
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    origin: u64,
}

impl TraceLog {
    /// Create a trace log whose time zero is now
    pub fn new(sink: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self { sink, clock, origin }
    }

    /// Seconds since the log was created
    pub fn elapsed(&self) -> f64 {
        self.clock.seconds(self.clock.now().saturating_sub(self.origin))
    }

    /// Whether trace output is currently suppressed
    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    /// Write a trace line unless the sink is paused
    pub fn line(&self, message: fmt::Arguments<'_>) {
        if self.sink.is_paused() {
            return;
        }
        self.write(message);
    }

    /// Write report lines regardless of the pause gate
    pub fn report(&self, lines: &[String]) {
        for line in lines {
            self.write(format_args!("{}", line));
        }
    }

    fn write(&self, message: fmt::Arguments<'_>) {
        let line = format!("[{:.6}] {}", self.elapsed(), message);
        self.sink.write_line(&line);
    }
}

impl fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLog").field("origin", &self.origin).finish()
    }
}

/// Interval of clock ticks during which call tracing is enabled
///
/// Defaults to always open. `until == u64::MAX` means open-ended.
#[derive(Debug)]
pub struct TraceWindow {
    from: AtomicU64,
    until: AtomicU64,
}

impl TraceWindow {
    /// Window that is always open
    pub fn new() -> Self {
        Self {
            from: AtomicU64::new(0),
            until: AtomicU64::new(u64::MAX),
        }
    }

    /// Open the window `delay` after `now` for `duration`, zero duration
    /// meaning it never closes
    pub fn schedule(&self, clock: &dyn Clock, delay: Duration, duration: Duration) {
        let from = clock.now().saturating_add(clock.ticks(delay));
        let until = if duration.is_zero() {
            u64::MAX
        } else {
            from.saturating_add(clock.ticks(duration))
        };
        self.from.store(from, Ordering::Relaxed);
        self.until.store(until, Ordering::Relaxed);
    }

    /// Reopen the window permanently
    pub fn clear(&self) {
        self.from.store(0, Ordering::Relaxed);
        self.until.store(u64::MAX, Ordering::Relaxed);
    }

    /// Whether tracing is enabled at tick `now`
    pub fn contains(&self, now: u64) -> bool {
        now >= self.from.load(Ordering::Relaxed) && now < self.until.load(Ordering::Relaxed)
    }
}

impl Default for TraceWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// [`LogSink`] that forwards lines to the `log` facade
///
/// Lines are logged at info level under the `snoop::trace` target.
#[derive(Debug, Default)]
pub struct LogFacadeSink {
    paused: AtomicBool,
}

impl LogFacadeSink {
    /// Create an unpaused sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress trace lines
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume trace lines
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }
}

impl LogSink for LogFacadeSink {
    fn write_line(&self, line: &str) {
        log::info!(target: "snoop::trace", "{}", line);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}
