//! Profiling accumulators and reports
//!
//! Every client context owns a [`ProfilingTable`] with one accumulator per
//! entry point. The owning client's thread updates it on every call while
//! control threads read it for reports or re-base it when profiling starts.
//! Accumulators are atomics, so those readers never block the call path.
//!
//! Resetting on `start` is not coordinated with calls already in flight on
//! other threads: such a call lands in the old or the new epoch.
//!
//! # Report Layout
//!
//! ```text
//! Profiling results for 'cube' (task 0x1f2a0):
//!   4.000000 s elapsed, 1.250000 s in driver (31.25%)
//! Function                              Calls   Errors    Nulls     Total ms     Avg us   % ctx   % all
//! glDrawElements                          240        0        0      812.500   3385.417   65.00   40.20
//! ...
//! Draw calls: 240 (60.0/s)
//! Frames: 60 (4.0 draw calls/frame)
//! Triangles            720000 vertices, 180000.0/s, 3000.0/draw call
//! ```

use crate::descriptor::{CallRole, FamilyDescriptor, FunctionId};
use crate::platform::Clock;
use crate::primitives::{rate, PrimitiveCounter, PrimitiveRow};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Accumulators for one entry point
#[derive(Debug, Default)]
pub struct FunctionStats {
    calls: AtomicU64,
    errors: AtomicU64,
    nulls: AtomicU64,
    ticks: AtomicU64,
}

impl FunctionStats {
    fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.nulls.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
    }
}

/// Copy of one entry point's accumulators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub id: FunctionId,
    pub calls: u64,
    pub errors: u64,
    pub nulls: u64,
    pub ticks: u64,
}

/// Per-context profiling accumulators
#[derive(Debug)]
pub struct ProfilingTable {
    functions: Box<[FunctionStats]>,
    /// Tick count when profiling (re)started for this context
    start_ticks: AtomicU64,
    /// Ticks measured inside the driver over all entry points
    total_ticks: AtomicU64,
}

impl ProfilingTable {
    /// Create a table for `len` entry points, starting at `now`
    pub fn new(len: usize, now: u64) -> Self {
        Self {
            functions: (0..len).map(|_| FunctionStats::default()).collect(),
            start_ticks: AtomicU64::new(now),
            total_ticks: AtomicU64::new(0),
        }
    }

    /// Record one completed call of `id` that took `ticks`
    pub fn record_call(&self, id: FunctionId, ticks: u64) {
        if let Some(stats) = self.functions.get(id.index()) {
            stats.calls.fetch_add(1, Ordering::Relaxed);
            stats.ticks.fetch_add(ticks, Ordering::Relaxed);
            self.total_ticks.fetch_add(ticks, Ordering::Relaxed);
        }
    }

    /// Record a failed status
    pub fn record_error(&self, id: FunctionId) {
        if let Some(stats) = self.functions.get(id.index()) {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a null result
    pub fn record_null(&self, id: FunctionId) {
        if let Some(stats) = self.functions.get(id.index()) {
            stats.nulls.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Accumulators of one entry point
    pub fn stats(&self, id: FunctionId) -> Option<StatsSnapshot> {
        self.functions.get(id.index()).map(|s| StatsSnapshot {
            id,
            calls: s.calls.load(Ordering::Relaxed),
            errors: s.errors.load(Ordering::Relaxed),
            nulls: s.nulls.load(Ordering::Relaxed),
            ticks: s.ticks.load(Ordering::Relaxed),
        })
    }

    /// Copy of every accumulator, in table order
    pub fn snapshot(&self) -> Vec<StatsSnapshot> {
        (0..self.functions.len())
            .filter_map(|i| self.stats(FunctionId(i as u16)))
            .collect()
    }

    /// Copy of every accumulator, longest cumulative duration first
    pub fn sorted_by_duration(&self) -> Vec<StatsSnapshot> {
        let mut rows = self.snapshot();
        sort_by_duration(&mut rows);
        rows
    }

    /// Zero every accumulator and re-base the start time
    pub fn reset(&self, now: u64) {
        for stats in self.functions.iter() {
            stats.reset();
        }
        self.total_ticks.store(0, Ordering::Relaxed);
        self.start_ticks.store(now, Ordering::Relaxed);
    }

    /// Tick count at the last (re)start
    pub fn start_ticks(&self) -> u64 {
        self.start_ticks.load(Ordering::Relaxed)
    }

    /// Ticks measured inside the driver
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks.load(Ordering::Relaxed)
    }

    /// Number of entry points
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table has no entry points
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Sort accumulators by descending cumulative ticks; ties in any order
pub fn sort_by_duration(rows: &mut [StatsSnapshot]) {
    rows.sort_unstable_by(|a, b| b.ticks.cmp(&a.ticks));
}

/// Tallies shared by every context of every family
#[derive(Debug, Default)]
pub struct GlobalCounters {
    /// Ticks measured over all contexts since profiling started
    ticks: AtomicU64,
    /// Failed statuses, polled errors and null results
    errors: AtomicU64,
    /// Whether a profiling run is in progress
    active: AtomicBool,
}

impl GlobalCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Add measured ticks
    pub fn add_ticks(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Count one error
    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Measured ticks over all contexts
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Errors over all contexts
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Begin a profiling run
    pub fn start(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    /// End a profiling run; returns whether one was in progress
    pub fn finish(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Whether a profiling run is in progress
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// One entry point line of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: &'static str,
    pub calls: u64,
    pub errors: u64,
    pub nulls: u64,
    pub total_ms: f64,
    pub average_us: f64,
    pub percent_of_context: f64,
    pub percent_of_global: f64,
}

/// What a report is built from
pub struct ReportSource<'a> {
    /// Client display name
    pub client: &'a str,
    /// Owning task id
    pub task_id: u64,
    /// Family the context belongs to
    pub family: &'a FamilyDescriptor,
    /// Context accumulators
    pub table: &'a ProfilingTable,
    /// Context primitive counters
    pub primitives: &'a PrimitiveCounter,
    /// Polled error codes lost to a full deferred queue
    pub dropped_errors: u64,
}

/// Aggregated profiling results of one client context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub family: &'static str,
    pub client: String,
    pub task_id: u64,
    pub elapsed_seconds: f64,
    pub driver_seconds: f64,
    pub driver_percent: f64,
    pub rows: Vec<ReportRow>,
    pub draw_calls: u64,
    pub frames: u64,
    pub draw_calls_per_second: f64,
    pub draw_calls_per_frame: Option<f64>,
    pub primitives: Vec<PrimitiveRow>,
    pub dropped_errors: u64,
}

impl ProfileReport {
    /// Build a report from a context's live accumulators
    pub fn build(source: ReportSource<'_>, clock: &dyn Clock, globals: &GlobalCounters) -> Self {
        let elapsed_ticks = clock.now().saturating_sub(source.table.start_ticks());
        let elapsed_seconds = clock.seconds(elapsed_ticks);
        let context_ticks = source.table.total_ticks();
        let global_ticks = globals.ticks();

        let mut draw_calls = 0;
        let mut frames = 0;
        let mut rows = Vec::new();

        for stats in source.table.sorted_by_duration() {
            if stats.calls == 0 {
                continue;
            }

            match source.family.descriptor(stats.id).map(|d| d.role) {
                Some(CallRole::Draw) => draw_calls += stats.calls,
                Some(CallRole::Frame) => frames += stats.calls,
                _ => {}
            }

            let seconds = clock.seconds(stats.ticks);
            rows.push(ReportRow {
                name: source.family.name_of(stats.id),
                calls: stats.calls,
                errors: stats.errors,
                nulls: stats.nulls,
                total_ms: seconds * 1000.0,
                average_us: rate(seconds * 1_000_000.0, stats.calls as f64),
                percent_of_context: rate(stats.ticks as f64 * 100.0, context_ticks as f64),
                percent_of_global: rate(stats.ticks as f64 * 100.0, global_ticks as f64),
            });
        }

        Self {
            family: source.family.name,
            client: source.client.to_string(),
            task_id: source.task_id,
            elapsed_seconds,
            driver_seconds: clock.seconds(context_ticks),
            driver_percent: rate(context_ticks as f64 * 100.0, elapsed_ticks as f64),
            rows,
            draw_calls,
            frames,
            draw_calls_per_second: rate(draw_calls as f64, elapsed_seconds),
            draw_calls_per_frame: if frames > 0 {
                Some(draw_calls as f64 / frames as f64)
            } else {
                None
            },
            primitives: source.primitives.breakdown(elapsed_seconds, draw_calls),
            dropped_errors: source.dropped_errors,
        }
    }

    /// Find the row of an entry point
    pub fn row(&self, name: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Render as text lines
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + self.primitives.len() + 6);

        lines.push(format!(
            "{} profiling results for '{}' (task {:#x}):",
            self.family, self.client, self.task_id
        ));
        lines.push(format!(
            "  {:.6} s elapsed, {:.6} s in driver ({:.2}%)",
            self.elapsed_seconds, self.driver_seconds, self.driver_percent
        ));
        lines.push(format!(
            "{:<36} {:>10} {:>8} {:>8} {:>12} {:>10} {:>7} {:>7}",
            "Function", "Calls", "Errors", "Nulls", "Total ms", "Avg us", "% ctx", "% all"
        ));

        for row in &self.rows {
            lines.push(format!(
                "{:<36} {:>10} {:>8} {:>8} {:>12.3} {:>10.3} {:>7.2} {:>7.2}",
                row.name,
                row.calls,
                row.errors,
                row.nulls,
                row.total_ms,
                row.average_us,
                row.percent_of_context,
                row.percent_of_global
            ));
        }

        lines.push(format!(
            "Draw calls: {} ({:.1}/s)",
            self.draw_calls, self.draw_calls_per_second
        ));
        if let Some(per_frame) = self.draw_calls_per_frame {
            lines.push(format!("Frames: {} ({:.1} draw calls/frame)", self.frames, per_frame));
        }
        if self.dropped_errors > 0 {
            lines.push(format!("Deferred errors dropped: {}", self.dropped_errors));
        }

        for prim in &self.primitives {
            lines.push(format!(
                "{:<20} {:>12} vertices, {:.1}/s, {:.1}/draw call",
                prim.topology.label(),
                prim.vertices,
                prim.per_second,
                prim.per_draw_call
            ));
        }

        lines
    }
}
