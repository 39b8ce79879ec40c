//! Collaborator interfaces
//!
//! The engine never touches a native function table, a driver library or a
//! timer directly. Everything ABI- or host-specific is injected through the
//! traits in this module:
//!
//! - [`FunctionTable`] patches and restores entry points and owns the
//!   trampolines that call back into the engine
//! - [`DriverLibrary`] opens the shared driver library and installs the
//!   single top-level hook that reports new and dying clients
//! - [`Clock`] reads elapsed ticks and waits
//! - [`LogSink`] receives trace and report lines
//!
//! Handles are opaque identities: they are compared and passed back to the
//! collaborators, never dereferenced.

use crate::descriptor::FunctionId;
use crate::error::Result;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identity of a client's native interface or context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(usize);

impl ClientHandle {
    /// Wrap a raw native handle
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw handle value
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identity of the function table that belongs to one client instance
///
/// For interface-table drivers this is the interface itself, for
/// per-context drivers it is the context's function-pointer struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHandle(usize);

impl TableHandle {
    /// Wrap a raw table handle
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw handle value
    pub fn raw(&self) -> usize {
        self.0
    }
}

/// Opaque, non-null code address of an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(NonZeroUsize);

impl EntryPoint {
    /// Wrap a code address, `None` for null
    pub const fn from_addr(addr: usize) -> Option<Self> {
        match NonZeroUsize::new(addr) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Get the code address
    pub fn addr(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Diagnostic identity of the task that owns a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Native task/process id
    pub task_id: u64,
    /// Human-readable task name
    pub name: String,
}

impl ClientIdentity {
    /// Create a new identity
    pub fn new(task_id: u64, name: impl Into<String>) -> Self {
        Self {
            task_id,
            name: name.into(),
        }
    }
}

/// Everything the driver hook knows about a freshly created client
#[derive(Debug, Clone)]
pub struct ClientInstance {
    /// Interface/context handle used to find the client on every call
    pub handle: ClientHandle,
    /// Function table to patch for this client
    pub table: TableHandle,
    /// Owning task
    pub identity: ClientIdentity,
}

/// Entry-point patching capability supplied by the host platform
///
/// `patch` and `restore` must be atomic with respect to calls arriving
/// concurrently on the same table.
pub trait FunctionTable: Send + Sync {
    /// Trampoline for `id` that forwards into the family's interceptor,
    /// `None` if the platform has no trampoline for it
    fn wrapper(&self, id: FunctionId) -> Option<EntryPoint>;

    /// Install `replacement` in slot `id` of `table`, returning the entry
    /// that was there before (`None` if the driver never resolved it)
    fn patch(&self, table: TableHandle, id: FunctionId, replacement: EntryPoint) -> Option<EntryPoint>;

    /// Put a previously saved entry back into slot `id`
    fn restore(&self, table: TableHandle, id: FunctionId, original: EntryPoint);

    /// Call the native "get last error" entry point of `table`
    fn poll_error(&self, table: TableHandle, original: EntryPoint) -> u32;
}

/// Receiver of client lifecycle events from a driver's top-level hook
pub trait ClientEvents: Send + Sync {
    /// A client created a new interface or context
    fn client_created(&self, instance: ClientInstance);

    /// A client is destroying its interface or context
    fn client_destroyed(&self, handle: ClientHandle);
}

/// A shared driver library and its top-level creation hook
pub trait DriverLibrary: Send + Sync {
    /// Library name for diagnostics
    fn name(&self) -> &str;

    /// Open the shared library
    fn open(&mut self) -> Result<()>;

    /// Hook client creation/destruction, routing events to `events`
    fn install_hook(&mut self, events: Arc<dyn ClientEvents>) -> Result<()>;

    /// Undo `install_hook`; no new clients are reported afterwards
    fn remove_hook(&mut self);

    /// Close the shared library
    fn close(&mut self);
}

/// Timing source
pub trait Clock: Send + Sync {
    /// Current tick count
    fn now(&self) -> u64;

    /// Ticks per second
    fn frequency(&self) -> u64;

    /// Block the calling thread
    fn sleep(&self, duration: Duration);

    /// Convert a tick delta into seconds
    fn seconds(&self, ticks: u64) -> f64 {
        let freq = self.frequency();
        if freq == 0 {
            0.0
        } else {
            ticks as f64 / freq as f64
        }
    }

    /// Convert a duration into ticks
    fn ticks(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.frequency() as f64) as u64
    }
}

/// Destination for trace and report lines
pub trait LogSink: Send + Sync {
    /// Write one complete line (without trailing newline)
    fn write_line(&self, line: &str);

    /// Whether the pause gate is closed for trace output
    fn is_paused(&self) -> bool {
        false
    }
}

/// Monotonic clock with nanosecond ticks
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose tick zero is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn frequency(&self) -> u64 {
        1_000_000_000
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
