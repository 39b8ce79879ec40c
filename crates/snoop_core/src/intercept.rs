//! Interception protocol
//!
//! One [`Interceptor`] serves every instrumented entry point of a driver
//! family. The platform trampoline installed in a client's function table
//! calls [`Interceptor::invoke`] with the calling client's handle, the
//! entry point's [`FunctionId`] and a closure that performs the native call
//! with the client's exact arguments:
//!
//! ```ignore
//! let status = interceptor.invoke(
//!     Call::new(context, NovaFn::BindTexture).args(&format_args!("{}, {:p}", unit, texture)),
//!     |original| unsafe { bind_texture(original, context, unit, texture) },
//! );
//! ```
//!
//! The result of the closure is returned unchanged. Only counters and the
//! trace log observe the call.
//!
//! # Protocol
//!
//! 1. Resolve the client's context; an unknown client is a defect, logged
//!    and forwarded through the family's last known original if any
//! 2. No saved original: the call is skipped and not counted
//! 3. Time the native call and accumulate
//! 4. Run the descriptor's result check and the family's error poll
//! 5. Trace

use crate::context::ClientContext;
use crate::descriptor::{CallRole, FamilyDescriptor, FunctionId, ResultCheck};
use crate::platform::{ClientHandle, Clock, EntryPoint, FunctionTable};
use crate::primitives::DrawCall;
use crate::profiling::GlobalCounters;
use crate::registry::Registry;
use crate::trace::{TraceLog, TraceWindow};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Return value of an intercepted entry point
pub trait Outcome: fmt::Debug + Sized {
    /// Value handed to the client when the call is skipped
    fn skipped() -> Self;

    /// Status code carried by the result, if any
    fn status(&self) -> Option<u32> {
        None
    }

    /// Whether the result is a null pointer
    fn is_null(&self) -> bool {
        false
    }
}

impl Outcome for () {
    fn skipped() -> Self {}
}

impl Outcome for bool {
    fn skipped() -> Self {
        false
    }
}

impl Outcome for u32 {
    fn skipped() -> Self {
        0
    }

    fn status(&self) -> Option<u32> {
        Some(*self)
    }
}

impl Outcome for i32 {
    fn skipped() -> Self {
        0
    }

    fn status(&self) -> Option<u32> {
        Some(*self as u32)
    }
}

impl Outcome for u64 {
    fn skipped() -> Self {
        0
    }
}

impl Outcome for f32 {
    fn skipped() -> Self {
        0.0
    }
}

impl<T> Outcome for *mut T {
    fn skipped() -> Self {
        std::ptr::null_mut()
    }

    fn is_null(&self) -> bool {
        <*mut T>::is_null(*self)
    }
}

impl<T> Outcome for *const T {
    fn skipped() -> Self {
        std::ptr::null()
    }

    fn is_null(&self) -> bool {
        <*const T>::is_null(*self)
    }
}

/// Result paired with a status written through an out parameter
///
/// Constructors of per-context drivers return the new object and report
/// the error code separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithStatus<T> {
    pub value: T,
    pub status: u32,
}

impl<T> WithStatus<T> {
    pub fn new(value: T, status: u32) -> Self {
        Self { value, status }
    }
}

impl<T: Outcome> Outcome for WithStatus<T> {
    fn skipped() -> Self {
        Self {
            value: T::skipped(),
            status: 0,
        }
    }

    fn status(&self) -> Option<u32> {
        Some(self.status)
    }

    fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// One intercepted call as seen by the trampoline
#[derive(Clone, Copy)]
pub struct Call<'a> {
    handle: ClientHandle,
    id: FunctionId,
    args: &'a dyn fmt::Display,
    draw: Option<DrawCall>,
}

impl<'a> Call<'a> {
    /// Call of `id` by the client owning `handle`
    pub fn new(handle: ClientHandle, id: impl Into<FunctionId>) -> Self {
        Self {
            handle,
            id: id.into(),
            args: &"",
            draw: None,
        }
    }

    /// Decoded arguments for the trace line
    pub fn args(mut self, args: &'a dyn fmt::Display) -> Self {
        self.args = args;
        self
    }

    /// Vertices submitted by a draw call, `None` when undecodable
    pub fn draw(mut self, draw: impl Into<Option<DrawCall>>) -> Self {
        self.draw = draw.into();
        self
    }

    /// Calling client
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// Called entry point
    pub fn id(&self) -> FunctionId {
        self.id
    }
}

impl fmt::Debug for Call<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("args", &format_args!("{}", self.args))
            .field("draw", &self.draw)
            .finish()
    }
}

/// Shared services an [`Interceptor`] is built from
#[derive(Clone)]
pub struct InterceptorParts {
    pub registry: Arc<Registry>,
    pub table: Arc<dyn FunctionTable>,
    pub clock: Arc<dyn Clock>,
    pub trace: Arc<TraceLog>,
    pub globals: Arc<GlobalCounters>,
}

/// Generic call wrapper for one driver family
pub struct Interceptor {
    family: &'static FamilyDescriptor,
    registry: Arc<Registry>,
    table: Arc<dyn FunctionTable>,
    clock: Arc<dyn Clock>,
    trace: Arc<TraceLog>,
    globals: Arc<GlobalCounters>,
    /// Last original patched for each id over all clients, 0 if none
    fallback: Box<[AtomicUsize]>,
    window: TraceWindow,
}

impl Interceptor {
    /// Create the interceptor of `family`
    pub fn new(family: &'static FamilyDescriptor, parts: InterceptorParts) -> Self {
        Self {
            family,
            registry: parts.registry,
            table: parts.table,
            clock: parts.clock,
            trace: parts.trace,
            globals: parts.globals,
            fallback: (0..family.len()).map(|_| AtomicUsize::new(0)).collect(),
            window: TraceWindow::new(),
        }
    }

    pub fn family(&self) -> &'static FamilyDescriptor {
        self.family
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<dyn FunctionTable> {
        &self.table
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn trace(&self) -> &Arc<TraceLog> {
        &self.trace
    }

    pub fn globals(&self) -> &Arc<GlobalCounters> {
        &self.globals
    }

    /// Interval during which calls of this family are traced
    pub fn window(&self) -> &TraceWindow {
        &self.window
    }

    /// Record `original` as the last known entry point for `id`
    pub fn remember_original(&self, id: FunctionId, original: EntryPoint) {
        if let Some(slot) = self.fallback.get(id.index()) {
            slot.store(original.addr(), Ordering::Release);
        }
    }

    /// Last known entry point for `id` over all clients
    pub fn fallback_original(&self, id: FunctionId) -> Option<EntryPoint> {
        self.fallback
            .get(id.index())
            .and_then(|slot| EntryPoint::from_addr(slot.load(Ordering::Acquire)))
    }

    /// Run the interception protocol around one native call
    pub fn invoke<R: Outcome>(&self, call: Call<'_>, forward: impl FnOnce(EntryPoint) -> R) -> R {
        let name = self.family.name_of(call.id);

        let Some(context) = self.registry.find(call.handle) else {
            log::error!(
                "{}: {} called by unregistered client {}",
                self.family.name,
                name,
                call.handle
            );
            return match self.fallback_original(call.id) {
                Some(original) => forward(original),
                None => R::skipped(),
            };
        };

        let Some(original) = context.original(call.id) else {
            log::debug!(
                "{}: {} not resolved for '{}', skipping call",
                self.family.name,
                name,
                context.name()
            );
            return R::skipped();
        };

        let start = self.clock.now();
        let result = forward(original);
        let ticks = self.clock.now().saturating_sub(start);

        context.profiling().record_call(call.id, ticks);
        self.globals.add_ticks(ticks);

        let tracing = self.is_tracing();
        self.check_result(&context, call.id, &result, tracing);

        if let Some(draw) = call.draw {
            let counted = self
                .family
                .descriptor(call.id)
                .map_or(false, |d| d.role == CallRole::Draw);
            if counted {
                context.primitives().add(draw);
            }
        }

        self.poll_error(&context, call.id, tracing);

        if tracing {
            self.trace.line(format_args!(
                "{}: {}({}) -> {:?}",
                context.name(),
                name,
                call.args,
                result
            ));
        }

        result
    }

    /// Intercept the family's "get last error" entry point
    ///
    /// Hands out the oldest deferred code if one is queued, otherwise
    /// forwards like any other call.
    pub fn invoke_error_poll(&self, call: Call<'_>, forward: impl FnOnce(EntryPoint) -> u32) -> u32 {
        if let Some(context) = self.registry.find(call.handle) {
            if let Some(code) = context.pop_error() {
                context.profiling().record_call(call.id, 0);
                if self.is_tracing() {
                    self.trace.line(format_args!(
                        "{}: {}() -> {:#x} (deferred)",
                        context.name(),
                        self.family.name_of(call.id),
                        code
                    ));
                }
                return code;
            }
        }

        self.invoke(call, forward)
    }

    fn is_tracing(&self) -> bool {
        !self.trace.is_paused() && self.window.contains(self.clock.now())
    }

    fn check_result<R: Outcome>(&self, context: &ClientContext, id: FunctionId, result: &R, tracing: bool) {
        let Some(descriptor) = self.family.descriptor(id) else {
            return;
        };

        let (null_check, success) = match descriptor.check {
            ResultCheck::None => return,
            ResultCheck::Null => (true, None),
            ResultCheck::Status { success } => (false, Some(success)),
            ResultCheck::NullOrStatus { success } => (true, Some(success)),
        };

        if null_check && result.is_null() {
            context.profiling().record_null(id);
            self.globals.add_error();
            if tracing {
                self.trace.line(format_args!(
                    "{}: WARNING: {} returned NULL",
                    context.name(),
                    descriptor.name
                ));
            }
            return;
        }

        let failed = success.and_then(|success| result.status().filter(|&s| s != success));
        if let Some(status) = failed {
            context.profiling().record_error(id);
            self.globals.add_error();
            if tracing {
                self.trace.line(format_args!(
                    "{}: WARNING: {} failed with status {:#x}",
                    context.name(),
                    descriptor.name,
                    status
                ));
            }
        }
    }

    fn poll_error(&self, context: &ClientContext, id: FunctionId, tracing: bool) {
        let Some(poll) = self.family.error_poll else {
            return;
        };
        if poll == id {
            return;
        }
        let Some(poll_original) = context.original(poll) else {
            return;
        };

        let code = self.table.poll_error(context.table(), poll_original);
        if code == self.family.success_code {
            return;
        }

        context.profiling().record_error(id);
        self.globals.add_error();
        let queued = context.push_error(code);

        if tracing {
            self.trace.line(format_args!(
                "{}: WARNING: {} raised error {:#x}",
                context.name(),
                self.family.name_of(id),
                code
            ));
            if !queued {
                self.trace.line(format_args!(
                    "{}: error queue full, dropped {:#x}",
                    context.name(),
                    code
                ));
            }
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("family", &self.family.name)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FunctionDescriptor;
    use crate::platform::{ClientInstance, TableHandle};
    use crate::primitives::Topology;
    use crate::testing::{instance, CaptureSink, ManualClock, MockTable};
    use std::cell::Cell;
    use std::time::Duration;

    crate::entry_points! {
        enum TestFn in TEST_FUNCTIONS {
            Clear => FunctionDescriptor::plain("glClear"),
            Map => FunctionDescriptor::null_check("glMapBufferOES"),
            Status => FunctionDescriptor::status("glCheckFramebufferStatus", 0x8CD5),
            Draw => FunctionDescriptor::draw("glDrawArrays"),
            Missing => FunctionDescriptor::plain("glMissingEXT"),
            GetError => FunctionDescriptor::plain("glGetError"),
            Create => FunctionDescriptor::plain("W3DN_CreateTexture")
                .with_check(ResultCheck::NullOrStatus { success: 0 }),
        }
    }

    static POLLING: FamilyDescriptor = FamilyDescriptor {
        name: "Polling",
        functions: TEST_FUNCTIONS,
        error_poll: Some(TestFn::GetError.id()),
        success_code: 0,
    };

    static PLAIN: FamilyDescriptor = FamilyDescriptor {
        name: "Plain",
        functions: TEST_FUNCTIONS,
        error_poll: None,
        success_code: 0,
    };

    const NATIVE: usize = 0x7000;

    struct Fixture {
        interceptor: Interceptor,
        table: Arc<MockTable>,
        clock: Arc<ManualClock>,
        sink: Arc<CaptureSink>,
    }

    fn fixture(family: &'static FamilyDescriptor) -> Fixture {
        let table = Arc::new(MockTable::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let sink = Arc::new(CaptureSink::new());
        let interceptor = Interceptor::new(
            family,
            InterceptorParts {
                registry: Arc::new(Registry::new(4)),
                table: table.clone(),
                clock: clock.clone(),
                trace: Arc::new(TraceLog::new(sink.clone(), clock.clone())),
                globals: Arc::new(GlobalCounters::new()),
            },
        );
        Fixture {
            interceptor,
            table,
            clock,
            sink,
        }
    }

    /// Register a client with every entry point except `Missing` resolved
    fn register(fx: &Fixture, inst: ClientInstance) -> Arc<ClientContext> {
        let len = fx.interceptor.family().len();
        let context = fx
            .interceptor
            .registry()
            .try_insert(ClientContext::new(inst, len, 2, fx.clock.now()).unwrap())
            .unwrap();
        for f in TestFn::ALL {
            if *f != TestFn::Missing {
                let entry = EntryPoint::from_addr(NATIVE + *f as usize);
                context.set_original(f.id(), entry);
            }
        }
        context
    }

    #[test]
    fn test_pass_through() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        for i in 0..10u32 {
            let seen = Cell::new(None);
            let result = fx.interceptor.invoke(Call::new(handle, TestFn::Status), |original| {
                seen.set(Some(original.addr()));
                fx.clock.advance(3);
                0x8CD5 + (i % 2)
            });
            assert_eq!(result, 0x8CD5 + (i % 2));
            assert_eq!(seen.get(), Some(NATIVE + TestFn::Status as usize));
        }

        let stats = ctx.profiling().stats(TestFn::Status.id()).unwrap();
        assert_eq!(stats.calls, 10);
        assert_eq!(stats.errors, 5);
        assert_eq!(stats.ticks, 30);
        assert_eq!(ctx.profiling().total_ticks(), 30);
        assert_eq!(fx.interceptor.globals().ticks(), 30);
        assert_eq!(fx.interceptor.globals().errors(), 5);
    }

    #[test]
    fn test_unresolved_call_skipped() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));

        let called = Cell::new(false);
        let result: *mut u8 = fx.interceptor.invoke(Call::new(ClientHandle::new(1), TestFn::Missing), |_| {
            called.set(true);
            0x10 as *mut u8
        });

        assert!(!called.get());
        assert!(result.is_null());
        assert_eq!(ctx.profiling().stats(TestFn::Missing.id()).unwrap().calls, 0);
    }

    #[test]
    fn test_unknown_client_uses_fallback() {
        let fx = fixture(&PLAIN);

        let dropped: u32 = fx.interceptor.invoke(Call::new(ClientHandle::new(9), TestFn::Status), |_| 7);
        assert_eq!(dropped, 0);

        let entry = EntryPoint::from_addr(0xabc).unwrap();
        fx.interceptor.remember_original(TestFn::Status.id(), entry);
        let forwarded = fx.interceptor.invoke(Call::new(ClientHandle::new(9), TestFn::Status), |original| {
            assert_eq!(original, entry);
            7u32
        });
        assert_eq!(forwarded, 7);
    }

    #[test]
    fn test_null_result_counted() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        let mut storage = 5u8;
        let ok: *mut u8 = fx.interceptor.invoke(Call::new(handle, TestFn::Map), |_| &mut storage as *mut u8);
        assert!(!ok.is_null());
        let null: *mut u8 = fx.interceptor.invoke(Call::new(handle, TestFn::Map), |_| std::ptr::null_mut());
        assert!(null.is_null());

        let stats = ctx.profiling().stats(TestFn::Map.id()).unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.nulls, 1);
        assert_eq!(fx.interceptor.globals().errors(), 1);
        assert!(fx.sink.contains("glMapBufferOES returned NULL"));
    }

    #[test]
    fn test_with_status_checked() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));

        let result = fx.interceptor.invoke(Call::new(ClientHandle::new(1), TestFn::Status), |_| {
            WithStatus::new(std::ptr::null::<u8>(), 0x8CD6)
        });
        assert_eq!(result.status, 0x8CD6);
        assert_eq!(ctx.profiling().stats(TestFn::Status.id()).unwrap().errors, 1);
    }

    #[test]
    fn test_null_or_status_counts_once() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);
        let texture = 0x4000 as *mut u8;

        fx.interceptor.invoke(Call::new(handle, TestFn::Create), |_| WithStatus::new(texture, 0));
        fx.interceptor.invoke(Call::new(handle, TestFn::Create), |_| WithStatus::new(texture, 3));
        fx.interceptor.invoke(Call::new(handle, TestFn::Create), |_| {
            WithStatus::new(std::ptr::null_mut::<u8>(), 3)
        });

        let stats = ctx.profiling().stats(TestFn::Create.id()).unwrap();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.nulls, 1);
        assert_eq!(fx.interceptor.globals().errors(), 2);
        assert!(fx.sink.contains("W3DN_CreateTexture failed with status 0x3"));
        assert!(fx.sink.contains("W3DN_CreateTexture returned NULL"));
    }

    #[test]
    fn test_draw_counts_primitives() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        fx.interceptor.invoke(
            Call::new(handle, TestFn::Draw).draw(DrawCall::new(Topology::Triangles, 36)),
            |_| (),
        );
        // Only draw entry points feed the counter
        fx.interceptor.invoke(
            Call::new(handle, TestFn::Clear).draw(DrawCall::new(Topology::Triangles, 36)),
            |_| (),
        );

        assert_eq!(ctx.primitives().get(Topology::Triangles), 36);
    }

    #[test]
    fn test_polled_errors_deferred() {
        let fx = fixture(&POLLING);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        fx.table.queue_error(0x502);
        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());

        assert_eq!(fx.table.polls(), 3);
        let stats = ctx.profiling().stats(TestFn::Clear.id()).unwrap();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(ctx.pending_errors(), 1);

        let native_polls = Cell::new(0);
        let poll = |_: EntryPoint| {
            native_polls.set(native_polls.get() + 1);
            0u32
        };
        assert_eq!(fx.interceptor.invoke_error_poll(Call::new(handle, TestFn::GetError), poll), 0x502);
        assert_eq!(fx.interceptor.invoke_error_poll(Call::new(handle, TestFn::GetError), poll), 0);
        assert_eq!(native_polls.get(), 1);

        // The poll entry point itself is never followed by a poll
        assert_eq!(fx.table.polls(), 3);
    }

    #[test]
    fn test_queue_overflow_noticed() {
        let fx = fixture(&POLLING);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        for code in [0x500, 0x501, 0x502] {
            fx.table.queue_error(code);
            fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        }

        assert_eq!(ctx.pending_errors(), 2);
        assert_eq!(ctx.pop_error(), Some(0x500));
        assert!(fx.sink.contains("error queue full, dropped 0x502"));
    }

    #[test]
    fn test_trace_line() {
        let fx = fixture(&PLAIN);
        register(&fx, instance(1, "cube"));

        let result = fx.interceptor.invoke(
            Call::new(ClientHandle::new(1), TestFn::Clear).args(&format_args!("{:#x}", 0x4100)),
            |_| (),
        );
        assert_eq!(result, ());
        assert!(fx.sink.contains("cube: glClear(0x4100) -> ()"));
    }

    #[test]
    fn test_trace_window_gates_lines_only() {
        let fx = fixture(&PLAIN);
        let ctx = register(&fx, instance(1, "cube"));
        let handle = ClientHandle::new(1);

        fx.interceptor
            .window()
            .schedule(fx.clock.as_ref(), Duration::from_secs(1), Duration::from_secs(1));
        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        assert!(fx.sink.lines().is_empty());

        fx.clock.advance(1_500_000);
        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        assert_eq!(fx.sink.lines().len(), 1);

        fx.clock.advance(1_000_000);
        fx.interceptor.invoke(Call::new(handle, TestFn::Clear), |_| ());
        assert_eq!(fx.sink.lines().len(), 1);
        assert_eq!(ctx.profiling().stats(TestFn::Clear.id()).unwrap().calls, 3);
    }

    #[test]
    fn test_contexts_are_separate() {
        let fx = fixture(&POLLING);
        let a = register(&fx, instance(1, "a"));
        let b = register(&fx, ClientInstance {
            table: TableHandle::new(20),
            ..instance(2, "b")
        });

        fx.table.queue_error(0x505);
        fx.interceptor.invoke(Call::new(ClientHandle::new(1), TestFn::Clear), |_| ());
        fx.interceptor.invoke(Call::new(ClientHandle::new(2), TestFn::Clear), |_| ());

        assert_eq!(a.pending_errors(), 1);
        assert_eq!(b.pending_errors(), 0);
        assert_eq!(b.profiling().stats(TestFn::Clear.id()).unwrap().calls, 1);
    }
}
