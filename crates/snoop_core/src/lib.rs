//! # snoop_core - Driver Call Interception and Profiling
//!
//! Attaches to a running client's 3D driver entry points, traces every
//! call, measures per-function time, counts failures and null results and
//! tallies submitted primitives, without the client noticing.
//!
//! ## Architecture
//!
//! ```text
//! Driver hook ──► Installer ──► Registry (one slot per client)
//!                     │              │
//!                     ▼              ▼
//!              FunctionTable    ClientContext ──► ProfilingTable
//!              (patch/restore)       │            PrimitiveCounter
//!                     │              │            DeferredErrorQueue
//!                     ▼              ▼
//! Client call ──► trampoline ──► Interceptor ──► original entry point
//!                                    │
//!                                    ▼
//!                                TraceLog ──► LogSink
//! ```
//!
//! Driver families are pure data: a descriptor table declared with
//! [`entry_points!`] and a [`FamilyDescriptor`]. Everything platform
//! specific (patching, the driver library, time, log output) is injected
//! through the traits in [`platform`].
//!
//! ## Key Invariants
//!
//! 1. **Pass-through** - arguments and results are forwarded unchanged
//! 2. **One context per client** - duplicate or excess clients are refused
//! 3. **Never fatal** - capacity and resolution failures degrade to
//!    passthrough, nothing aborts the host

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod error_queue;
pub mod filter;
pub mod installer;
pub mod intercept;
pub mod platform;
pub mod primitives;
pub mod profiling;
pub mod registry;
pub mod trace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SnoopConfig;
pub use context::ClientContext;
pub use descriptor::{CallRole, FamilyDescriptor, FunctionDescriptor, FunctionId, ResultCheck};
pub use error::{Result, SnoopError};
pub use error_queue::DeferredErrorQueue;
pub use filter::FilterSet;
pub use installer::{InstallSettings, InstallState, Installer};
pub use intercept::{Call, Interceptor, InterceptorParts, Outcome, WithStatus};
pub use platform::{
    ClientEvents, ClientHandle, ClientIdentity, ClientInstance, Clock, DriverLibrary, EntryPoint,
    FunctionTable, LogSink, MonotonicClock, TableHandle,
};
pub use primitives::{DrawCall, PrimitiveCounter, Topology};
pub use profiling::{GlobalCounters, ProfileReport, ProfilingTable, ReportRow};
pub use registry::Registry;
pub use trace::{LogFacadeSink, TraceLog, TraceWindow};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::descriptor::{FamilyDescriptor, FunctionDescriptor, FunctionId};
    pub use crate::error::{Result, SnoopError};
    pub use crate::installer::Installer;
    pub use crate::intercept::{Call, Interceptor, WithStatus};
    pub use crate::platform::{ClientHandle, Clock, DriverLibrary, EntryPoint, FunctionTable, LogSink};
    pub use crate::primitives::{DrawCall, Topology};
}
