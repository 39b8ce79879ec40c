//! Installer and uninstaller for one driver family
//!
//! ```text
//!   Uninstalled --install()--> Armed --hook installed--> Active
//!        ^                                                 |
//!        +------------------------remove()-----------------+
//! ```
//!
//! While active, the driver's top-level hook reports every new and dying
//! client. New clients get a registry slot and have their filtered entry
//! points patched; dying clients are reported, restored and released.

use crate::context::ClientContext;
use crate::error::Result;
use crate::filter::FilterSet;
use crate::intercept::Interceptor;
use crate::platform::{ClientEvents, ClientHandle, ClientInstance, DriverLibrary};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Installer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Library closed, no hook
    Uninstalled,
    /// Library open, hook being installed
    Armed,
    /// Hook installed, clients are being instrumented
    Active,
}

/// Installer tunables
#[derive(Debug, Clone, Copy)]
pub struct InstallSettings {
    /// Deferred error codes kept per client
    pub queue_capacity: usize,
    /// Wait after unpatching before the library is closed
    pub grace_period: Duration,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            queue_capacity: crate::error_queue::DEFAULT_QUEUE_CAPACITY,
            grace_period: Duration::from_millis(500),
        }
    }
}

/// Receives client events from the driver hook
struct ClientHooks {
    interceptor: Arc<Interceptor>,
    filter: Arc<FilterSet>,
    queue_capacity: usize,
}

impl ClientHooks {
    fn attach(&self, instance: ClientInstance) {
        let family = self.interceptor.family();
        let handle = instance.handle;
        let name = instance.identity.name.clone();
        let now = self.interceptor.clock().now();

        let inserted = ClientContext::new(instance, family.len(), self.queue_capacity, now)
            .and_then(|context| self.interceptor.registry().try_insert(context));
        let context = match inserted {
            Ok(context) => context,
            Err(e) => {
                log::warn!(
                    "{}: leaving '{}' ({}) uninstrumented: {}",
                    family.name,
                    name,
                    handle,
                    e
                );
                return;
            }
        };

        let table = self.interceptor.table();
        let mut patched = 0;

        for (id, descriptor) in family.entries() {
            if !family.is_error_poll(id) && !self.filter.matches(descriptor.name) {
                continue;
            }

            let Some(wrapper) = table.wrapper(id) else {
                log::debug!("{}: no trampoline for {}", family.name, descriptor.name);
                continue;
            };

            match table.patch(context.table(), id, wrapper) {
                Some(original) => {
                    context.set_original(id, Some(original));
                    self.interceptor.remember_original(id, original);
                    patched += 1;
                }
                None => {
                    log::debug!(
                        "{}: {} not resolved for '{}'",
                        family.name,
                        descriptor.name,
                        name
                    );
                }
            }
        }

        log::info!(
            "{}: instrumented '{}' ({}), {} entry points patched",
            family.name,
            name,
            handle,
            patched
        );
    }

    fn detach(&self, handle: ClientHandle) {
        let registry = self.interceptor.registry();
        let Some(context) = registry.find(handle) else {
            log::debug!(
                "{}: untracked client {} destroyed",
                self.interceptor.family().name,
                handle
            );
            return;
        };

        self.release(&context);
        registry.remove(handle);
    }

    /// Write the final report and put every saved entry point back
    fn release(&self, context: &ClientContext) {
        self.report(context);

        let table = self.interceptor.table();
        for (id, original) in context.take_originals() {
            table.restore(context.table(), id, original);
        }

        log::info!(
            "{}: released '{}' ({})",
            self.interceptor.family().name,
            context.name(),
            context.handle()
        );
    }

    fn report(&self, context: &ClientContext) {
        let report = context.report(
            self.interceptor.family(),
            self.interceptor.clock().as_ref(),
            self.interceptor.globals(),
        );
        self.interceptor.trace().report(&report.render());
    }
}

impl ClientEvents for ClientHooks {
    fn client_created(&self, instance: ClientInstance) {
        self.attach(instance);
    }

    fn client_destroyed(&self, handle: ClientHandle) {
        self.detach(handle);
    }
}

/// Installs, runs and removes the instrumentation of one driver family
pub struct Installer {
    hooks: Arc<ClientHooks>,
    driver: Mutex<Box<dyn DriverLibrary>>,
    state: Mutex<InstallState>,
    grace_period: Duration,
}

impl Installer {
    /// Create an uninstalled installer
    pub fn new(
        interceptor: Arc<Interceptor>,
        driver: Box<dyn DriverLibrary>,
        filter: Arc<FilterSet>,
        settings: InstallSettings,
    ) -> Self {
        Self {
            hooks: Arc::new(ClientHooks {
                interceptor,
                filter,
                queue_capacity: settings.queue_capacity,
            }),
            driver: Mutex::new(driver),
            state: Mutex::new(InstallState::Uninstalled),
            grace_period: settings.grace_period,
        }
    }

    /// The family's interceptor
    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.hooks.interceptor
    }

    /// Current state
    pub fn state(&self) -> InstallState {
        *self.state.lock()
    }

    /// Whether clients are being instrumented
    pub fn is_active(&self) -> bool {
        self.state() == InstallState::Active
    }

    /// Open the driver library and hook client creation
    ///
    /// A no-op when already installed. On failure nothing stays open.
    pub fn install(&self) -> Result<()> {
        let mut state = self.state.lock();
        let family = self.hooks.interceptor.family().name;
        if *state != InstallState::Uninstalled {
            log::debug!("{}: already installed", family);
            return Ok(());
        }

        let mut driver = self.driver.lock();
        if let Err(e) = driver.open() {
            log::error!("{}: {}", family, e);
            return Err(e);
        }
        *state = InstallState::Armed;

        let events: Arc<dyn ClientEvents> = self.hooks.clone();
        if let Err(e) = driver.install_hook(events) {
            log::error!("{}: {}", family, e);
            driver.close();
            *state = InstallState::Uninstalled;
            return Err(e);
        }
        *state = InstallState::Active;

        log::info!("{}: installed on '{}'", family, driver.name());
        Ok(())
    }

    /// Unhook, report and restore every live client, then close the library
    ///
    /// A no-op unless active.
    pub fn remove(&self) {
        let mut state = self.state.lock();
        let family = self.hooks.interceptor.family().name;
        if *state != InstallState::Active {
            log::debug!("{}: not installed", family);
            return;
        }

        let mut driver = self.driver.lock();
        driver.remove_hook();

        let mut released = 0;
        self.hooks.interceptor.registry().drain(|context| {
            self.hooks.release(&context);
            released += 1;
        });

        self.hooks.interceptor.clock().sleep(self.grace_period);
        driver.close();
        *state = InstallState::Uninstalled;

        log::info!("{}: removed, {} clients restored", family, released);
    }

    /// Zero the accumulators of every live client
    pub fn restart_profiling(&self) {
        let now = self.hooks.interceptor.clock().now();
        self.hooks
            .interceptor
            .registry()
            .for_each(|context| context.reset_profiling(now));
    }

    /// Report every live client
    pub fn report_all(&self) {
        self.hooks
            .interceptor
            .registry()
            .for_each(|context| self.hooks.report(context));
    }
}

impl Drop for Installer {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FamilyDescriptor, FunctionDescriptor, FunctionId};
    use crate::intercept::{Call, InterceptorParts};
    use crate::platform::{ClientHandle, TableHandle};
    use crate::profiling::GlobalCounters;
    use crate::registry::Registry;
    use crate::testing::{instance, CaptureSink, DriverEvents, ManualClock, MockDriver, MockTable};
    use crate::trace::TraceLog;

    crate::entry_points! {
        enum TestFn in TEST_FUNCTIONS {
            BindTexture => FunctionDescriptor::plain("glBindTexture"),
            Viewport => FunctionDescriptor::plain("glViewport"),
            Extension => FunctionDescriptor::plain("glBindVertexArrayOES"),
            GetError => FunctionDescriptor::plain("glGetError"),
        }
    }

    static FAMILY: FamilyDescriptor = FamilyDescriptor {
        name: "Test",
        functions: TEST_FUNCTIONS,
        error_poll: Some(TestFn::GetError.id()),
        success_code: 0,
    };

    struct Fixture {
        installer: Installer,
        events: DriverEvents,
        table: Arc<MockTable>,
        clock: Arc<ManualClock>,
        sink: Arc<CaptureSink>,
    }

    fn fixture(filter: FilterSet, capacity: usize) -> Fixture {
        fixture_with(filter, capacity, InstallSettings::default())
    }

    fn fixture_with(filter: FilterSet, capacity: usize, settings: InstallSettings) -> Fixture {
        let table = Arc::new(MockTable::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let sink = Arc::new(CaptureSink::new());
        let interceptor = Arc::new(Interceptor::new(
            &FAMILY,
            InterceptorParts {
                registry: Arc::new(Registry::new(capacity)),
                table: table.clone(),
                clock: clock.clone(),
                trace: Arc::new(TraceLog::new(sink.clone(), clock.clone())),
                globals: Arc::new(GlobalCounters::new()),
            },
        ));
        let (driver, events) = MockDriver::new("test.library");
        let installer = Installer::new(interceptor, Box::new(driver), Arc::new(filter), settings);
        Fixture {
            installer,
            events,
            table,
            clock,
            sink,
        }
    }

    /// Native entry points for everything but the extension
    fn resolve(table: &MockTable, raw: usize) {
        for f in [TestFn::BindTexture, TestFn::Viewport, TestFn::GetError] {
            table.install_native(TableHandle::new(raw), f, 0x9000 + raw * 0x100 + f as usize);
        }
    }

    #[test]
    fn test_install_remove_round_trip() {
        let fx = fixture(FilterSet::new(), 4);
        resolve(&fx.table, 1);
        let before: Vec<_> = TestFn::ALL
            .iter()
            .map(|f| fx.table.entry(TableHandle::new(1), *f))
            .collect();

        fx.installer.install().unwrap();
        assert_eq!(fx.installer.state(), InstallState::Active);
        assert!(fx.events.create(instance(1, "cube")));

        assert!(fx.table.is_wrapped(TableHandle::new(1), TestFn::BindTexture));
        assert!(fx.table.is_wrapped(TableHandle::new(1), TestFn::GetError));
        let context = fx.installer.interceptor().registry().find(ClientHandle::new(1)).unwrap();
        assert_eq!(context.patched_count(), 3);

        fx.installer.remove();
        let after: Vec<_> = TestFn::ALL
            .iter()
            .filter(|f| **f != TestFn::Extension)
            .map(|f| fx.table.entry(TableHandle::new(1), *f))
            .collect();
        assert_eq!(after, before.iter().copied().filter(Option::is_some).collect::<Vec<_>>());
        assert_eq!(fx.installer.state(), InstallState::Uninstalled);
        assert!(fx.installer.interceptor().registry().is_empty());
        assert!(!fx.events.is_hooked());
        assert!(!fx.events.is_open());
        assert_eq!(fx.clock.sleeps(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn test_unallocatable_context_leaves_client_unpatched() {
        let settings = InstallSettings {
            queue_capacity: usize::MAX / 2,
            ..InstallSettings::default()
        };
        let fx = fixture_with(FilterSet::new(), 4, settings);
        resolve(&fx.table, 1);
        fx.installer.install().unwrap();

        assert!(fx.events.create(instance(1, "cube")));
        assert_eq!(fx.table.wrapped_count(TableHandle::new(1)), 0);
        assert!(fx.installer.interceptor().registry().is_empty());

        let native = fx.table.entry(TableHandle::new(1), TestFn::BindTexture);
        assert_eq!(native.map(|e| e.addr()), Some(0x9000 + 0x100 + TestFn::BindTexture as usize));

        assert!(fx.events.destroy(ClientHandle::new(1)));
        fx.installer.remove();
        assert_eq!(fx.installer.state(), InstallState::Uninstalled);
    }

    #[test]
    fn test_install_idempotent() {
        let fx = fixture(FilterSet::new(), 4);
        fx.installer.install().unwrap();
        fx.installer.install().unwrap();
        assert_eq!(fx.events.opens(), 1);

        fx.installer.remove();
        fx.installer.remove();
        assert_eq!(fx.events.closes(), 1);
    }

    #[test]
    fn test_install_failure_leaves_nothing_open() {
        let fx = fixture(FilterSet::new(), 4);
        fx.events.fail_open(true);
        assert!(fx.installer.install().is_err());
        assert_eq!(fx.installer.state(), InstallState::Uninstalled);

        fx.events.fail_open(false);
        fx.events.fail_hook(true);
        assert!(fx.installer.install().is_err());
        assert_eq!(fx.installer.state(), InstallState::Uninstalled);
        assert!(!fx.events.is_open());

        fx.events.fail_hook(false);
        fx.installer.install().unwrap();
        assert!(fx.installer.is_active());
    }

    #[test]
    fn test_filter_gates_patching() {
        let fx = fixture(FilterSet::parse("Bind\n"), 4);
        resolve(&fx.table, 1);
        fx.installer.install().unwrap();
        fx.events.create(instance(1, "cube"));

        let table = TableHandle::new(1);
        assert!(fx.table.is_wrapped(table, TestFn::BindTexture));
        assert!(!fx.table.is_wrapped(table, TestFn::Viewport));
        // The error poll is always patched
        assert!(fx.table.is_wrapped(table, TestFn::GetError));
        // Matched but never resolved by the driver
        assert!(fx.table.is_wrapped(table, TestFn::Extension));

        let context = fx.installer.interceptor().registry().find(ClientHandle::new(1)).unwrap();
        assert_eq!(context.original(TestFn::Extension.id()), None);
        assert_eq!(context.patched_count(), 2);
    }

    #[test]
    fn test_registry_full_leaves_client_unpatched() {
        let fx = fixture(FilterSet::new(), 1);
        resolve(&fx.table, 1);
        resolve(&fx.table, 2);
        fx.installer.install().unwrap();

        fx.events.create(instance(1, "first"));
        fx.events.create(instance(2, "second"));

        assert_eq!(fx.table.wrapped_count(TableHandle::new(1)), 4);
        assert_eq!(fx.table.wrapped_count(TableHandle::new(2)), 0);
        assert!(fx.installer.interceptor().registry().find(ClientHandle::new(2)).is_none());
    }

    #[test]
    fn test_destroy_reports_and_restores() {
        let fx = fixture(FilterSet::new(), 2);
        resolve(&fx.table, 1);
        let native = fx.table.entry(TableHandle::new(1), TestFn::Viewport);
        fx.installer.install().unwrap();
        fx.events.create(instance(1, "cube"));

        let interceptor = fx.installer.interceptor();
        interceptor.invoke(Call::new(ClientHandle::new(1), TestFn::Viewport), |_| {
            fx.clock.advance(4);
        });

        assert!(fx.events.destroy(ClientHandle::new(1)));
        assert!(interceptor.registry().is_empty());
        assert_eq!(fx.table.entry(TableHandle::new(1), TestFn::Viewport), native);
        assert!(fx.sink.contains("Test profiling results for 'cube'"));
        assert!(fx.sink.lines().iter().any(|l| l.contains("glViewport") && l.contains(" 1 ")));

        // A second destruction is ignored
        assert!(fx.events.destroy(ClientHandle::new(1)));
    }

    #[test]
    fn test_restart_and_report_all() {
        let fx = fixture(FilterSet::new(), 2);
        resolve(&fx.table, 1);
        fx.installer.install().unwrap();
        fx.events.create(instance(1, "cube"));

        let interceptor = fx.installer.interceptor();
        interceptor.invoke(Call::new(ClientHandle::new(1), TestFn::Viewport), |_| ());
        fx.clock.advance(10);
        fx.installer.restart_profiling();

        let context = interceptor.registry().find(ClientHandle::new(1)).unwrap();
        assert_eq!(context.profiling().stats(FunctionId::from(TestFn::Viewport)).unwrap().calls, 0);
        assert_eq!(context.profiling().start_ticks(), 10);

        fx.installer.report_all();
        assert!(fx.sink.contains("profiling results for 'cube'"));
    }

    #[test]
    fn test_events_ignored_when_removed() {
        let fx = fixture(FilterSet::new(), 2);
        resolve(&fx.table, 1);
        assert!(!fx.events.create(instance(1, "cube")));
        assert_eq!(fx.table.patches(), 0);
    }
}
