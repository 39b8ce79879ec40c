//! In-memory collaborators for tests
//!
//! Available under `cfg(test)` and behind the `testing` feature so the
//! driver crate's integration tests can drive the engine without a real
//! driver library.

use crate::descriptor::FunctionId;
use crate::error::{Result, SnoopError};
use crate::platform::{ClientEvents, ClientHandle, ClientInstance, Clock, DriverLibrary, EntryPoint, LogSink, TableHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Base address of the fake trampolines handed out by [`MockTable`]
pub const WRAPPER_BASE: usize = 0x1000_0000;

// ========== Clock ==========

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
    frequency: u64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a clock at tick zero running at `frequency` ticks per second
    pub fn new(frequency: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            frequency,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Every duration passed to `sleep`
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(self.ticks(duration));
    }
}

// ========== Log Sink ==========

/// Sink that keeps every line in memory
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<String>>,
    paused: AtomicBool,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any line contains `fragment`
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(fragment))
    }

    /// Forget captured lines
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Open or close the pause gate
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

impl LogSink for CaptureSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

// ========== Function Table ==========

/// Function tables kept in a map of `(table, id) -> entry`
///
/// Trampolines are fake addresses `WRAPPER_BASE + id`. `poll_error`
/// returns scripted codes in order, then 0.
#[derive(Debug, Default)]
pub struct MockTable {
    slots: Mutex<HashMap<(TableHandle, FunctionId), EntryPoint>>,
    errors: Mutex<VecDeque<u32>>,
    polls: AtomicUsize,
    patches: AtomicUsize,
    restores: AtomicUsize,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trampoline address of `id`
    pub fn wrapper_addr(id: impl Into<FunctionId>) -> usize {
        WRAPPER_BASE + id.into().index()
    }

    /// Put a native entry point into a table, as the driver would
    pub fn install_native(&self, table: TableHandle, id: impl Into<FunctionId>, addr: usize) {
        if let Some(entry) = EntryPoint::from_addr(addr) {
            self.slots.lock().insert((table, id.into()), entry);
        }
    }

    /// Current content of a slot
    pub fn entry(&self, table: TableHandle, id: impl Into<FunctionId>) -> Option<EntryPoint> {
        self.slots.lock().get(&(table, id.into())).copied()
    }

    /// Whether a slot currently holds the trampoline
    pub fn is_wrapped(&self, table: TableHandle, id: impl Into<FunctionId>) -> bool {
        let id = id.into();
        self.entry(table, id).map(|e| e.addr()) == Some(Self::wrapper_addr(id))
    }

    /// Number of slots of `table` holding a trampoline
    pub fn wrapped_count(&self, table: TableHandle) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|((t, id), e)| *t == table && e.addr() == Self::wrapper_addr(*id))
            .count()
    }

    /// Script the next code returned by `poll_error`
    pub fn queue_error(&self, code: u32) {
        self.errors.lock().push_back(code);
    }

    /// Number of `poll_error` calls
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Number of `patch` calls
    pub fn patches(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Number of `restore` calls
    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl crate::platform::FunctionTable for MockTable {
    fn wrapper(&self, id: FunctionId) -> Option<EntryPoint> {
        EntryPoint::from_addr(Self::wrapper_addr(id))
    }

    fn patch(&self, table: TableHandle, id: FunctionId, replacement: EntryPoint) -> Option<EntryPoint> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().insert((table, id), replacement)
    }

    fn restore(&self, table: TableHandle, id: FunctionId, original: EntryPoint) {
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().insert((table, id), original);
    }

    fn poll_error(&self, _table: TableHandle, _original: EntryPoint) -> u32 {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.errors.lock().pop_front().unwrap_or(0)
    }
}

// ========== Driver Library ==========

#[derive(Default)]
struct DriverState {
    hook: Mutex<Option<Arc<dyn ClientEvents>>>,
    open: AtomicBool,
    fail_open: AtomicBool,
    fail_hook: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Driver library double; its [`DriverEvents`] twin fires the hook
pub struct MockDriver {
    name: String,
    state: Arc<DriverState>,
}

impl MockDriver {
    /// Create a driver and the handle that fires its events
    pub fn new(name: impl Into<String>) -> (Self, DriverEvents) {
        let state = Arc::new(DriverState::default());
        let driver = Self {
            name: name.into(),
            state: Arc::clone(&state),
        };
        (driver, DriverEvents { state })
    }
}

impl DriverLibrary for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(SnoopError::library_unavailable(self.name.clone(), "not found"));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn install_hook(&mut self, events: Arc<dyn ClientEvents>) -> Result<()> {
        if self.state.fail_hook.load(Ordering::SeqCst) {
            return Err(SnoopError::hook_failed(self.name.clone(), "creation hook refused"));
        }
        *self.state.hook.lock() = Some(events);
        Ok(())
    }

    fn remove_hook(&mut self) {
        self.state.hook.lock().take();
    }

    fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.open.store(false, Ordering::SeqCst);
    }
}

/// Test-side handle of a [`MockDriver`]
#[derive(Clone)]
pub struct DriverEvents {
    state: Arc<DriverState>,
}

impl DriverEvents {
    fn hook(&self) -> Option<Arc<dyn ClientEvents>> {
        self.state.hook.lock().clone()
    }

    /// Report a new client; returns whether a hook received it
    pub fn create(&self, instance: ClientInstance) -> bool {
        match self.hook() {
            Some(events) => {
                events.client_created(instance);
                true
            }
            None => false,
        }
    }

    /// Report a dying client; returns whether a hook received it
    pub fn destroy(&self, handle: ClientHandle) -> bool {
        match self.hook() {
            Some(events) => {
                events.client_destroyed(handle);
                true
            }
            None => false,
        }
    }

    /// Make the next `open` fail
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make the next `install_hook` fail
    pub fn fail_hook(&self, fail: bool) {
        self.state.fail_hook.store(fail, Ordering::SeqCst);
    }

    /// Whether the library is open
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Whether the creation hook is installed
    pub fn is_hooked(&self) -> bool {
        self.state.hook.lock().is_some()
    }

    /// Number of successful `open` calls
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of `close` calls
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

/// Client instance whose handle and table share the raw value `raw`
pub fn instance(raw: usize, name: &str) -> ClientInstance {
    ClientInstance {
        handle: ClientHandle::new(raw),
        table: TableHandle::new(raw),
        identity: crate::platform::ClientIdentity::new(raw as u64, name),
    }
}
