//! Per-client context
//!
//! One [`ClientContext`] exists per intercepted interface or context. It
//! owns the entry points saved at patch time, the profiling accumulators,
//! the primitive counters and the deferred error queue of that client.
//!
//! Only the client's own calls mutate the context on the hot path; report,
//! profiling restart and teardown reach it through the registry.

use crate::descriptor::{FamilyDescriptor, FunctionId};
use crate::error::Result;
use crate::error_queue::DeferredErrorQueue;
use crate::platform::{ClientHandle, ClientIdentity, ClientInstance, Clock, EntryPoint, TableHandle};
use crate::primitives::PrimitiveCounter;
use crate::profiling::{GlobalCounters, ProfileReport, ProfilingTable, ReportSource};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// State tracked for one client instance
#[derive(Debug)]
pub struct ClientContext {
    handle: ClientHandle,
    table: TableHandle,
    identity: ClientIdentity,
    /// Saved entry points by function id, 0 when never patched or unresolved
    originals: Box<[AtomicUsize]>,
    profiling: ProfilingTable,
    primitives: PrimitiveCounter,
    errors: Mutex<DeferredErrorQueue>,
}

impl ClientContext {
    /// Create the context for a new client instance
    ///
    /// Fails when the saved entry points or the error queue cannot be
    /// allocated; the client is then left uninstrumented.
    pub fn new(instance: ClientInstance, functions: usize, queue_capacity: usize, now: u64) -> Result<Self> {
        let mut originals = Vec::new();
        originals.try_reserve_exact(functions)?;
        originals.extend((0..functions).map(|_| AtomicUsize::new(0)));
        let errors = DeferredErrorQueue::new(queue_capacity)?;

        Ok(Self {
            handle: instance.handle,
            table: instance.table,
            identity: instance.identity,
            originals: originals.into_boxed_slice(),
            profiling: ProfilingTable::new(functions, now),
            primitives: PrimitiveCounter::new(),
            errors: Mutex::new(errors),
        })
    }

    /// Interface/context handle
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// Function table patched for this client
    pub fn table(&self) -> TableHandle {
        self.table
    }

    /// Owning task
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Display name used in traces and reports
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    // ========== Saved Entry Points ==========

    /// Remember the entry point that was replaced in slot `id`
    pub fn set_original(&self, id: FunctionId, original: Option<EntryPoint>) {
        if let Some(slot) = self.originals.get(id.index()) {
            slot.store(original.map_or(0, |e| e.addr()), Ordering::Release);
        }
    }

    /// Entry point to forward calls of `id` to
    pub fn original(&self, id: FunctionId) -> Option<EntryPoint> {
        self.originals
            .get(id.index())
            .and_then(|slot| EntryPoint::from_addr(slot.load(Ordering::Acquire)))
    }

    /// Remove and return every saved entry point
    pub fn take_originals(&self) -> Vec<(FunctionId, EntryPoint)> {
        self.originals
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                EntryPoint::from_addr(slot.swap(0, Ordering::AcqRel)).map(|e| (FunctionId(i as u16), e))
            })
            .collect()
    }

    /// Number of saved entry points
    pub fn patched_count(&self) -> usize {
        self.originals
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != 0)
            .count()
    }

    // ========== Counters ==========

    /// Profiling accumulators
    pub fn profiling(&self) -> &ProfilingTable {
        &self.profiling
    }

    /// Primitive counters
    pub fn primitives(&self) -> &PrimitiveCounter {
        &self.primitives
    }

    /// Zero the accumulators and re-base the start time
    pub fn reset_profiling(&self, now: u64) {
        self.profiling.reset(now);
        self.primitives.reset();
    }

    // ========== Deferred Errors ==========

    /// Queue a polled error code
    pub fn push_error(&self, code: u32) -> bool {
        self.errors.lock().push(code)
    }

    /// Take the oldest queued error code
    pub fn pop_error(&self) -> Option<u32> {
        self.errors.lock().pop()
    }

    /// Number of queued error codes
    pub fn pending_errors(&self) -> usize {
        self.errors.lock().len()
    }

    /// Build a profiling report for this client
    pub fn report(&self, family: &FamilyDescriptor, clock: &dyn Clock, globals: &GlobalCounters) -> ProfileReport {
        ProfileReport::build(
            ReportSource {
                client: self.name(),
                task_id: self.identity.task_id,
                family,
                table: &self.profiling,
                primitives: &self.primitives,
                dropped_errors: self.errors.lock().dropped(),
            },
            clock,
            globals,
        )
    }
}
