//! Control surface
//!
//! [`Snoop`] owns one [`Installer`] per driver family and exposes the
//! operations a front-end drives: install and remove each family, start
//! and finish a profiling run, and the status strings. Every operation is a
//! no-op when invoked in the wrong state.

use crate::nova::NOVA;
use crate::ogles2::OGLES2;
use snoop_core::{
    Clock, DriverLibrary, FamilyDescriptor, FunctionTable, GlobalCounters, Installer, Interceptor, InterceptorParts,
    LogSink, Registry, Result, SnoopConfig, TraceLog,
};
use std::sync::Arc;
use std::time::Duration;

/// Host-specific collaborators
pub struct Platform {
    /// OGLES2 shared library and its interface creation hook
    pub ogles2_library: Box<dyn DriverLibrary>,
    /// Patching capability for OGLES2 interfaces
    pub ogles2_table: Arc<dyn FunctionTable>,
    /// Warp3D Nova shared library and its context creation hook
    pub nova_library: Box<dyn DriverLibrary>,
    /// Patching capability for Nova contexts
    pub nova_table: Arc<dyn FunctionTable>,
    /// Timing source
    pub clock: Arc<dyn Clock>,
    /// Destination of trace and report lines
    pub sink: Arc<dyn LogSink>,
}

/// Interception engine for both driver families
pub struct Snoop {
    config: SnoopConfig,
    globals: Arc<GlobalCounters>,
    ogles2: Installer,
    nova: Installer,
}

impl Snoop {
    /// Build the engine; nothing is installed yet
    pub fn new(config: SnoopConfig, platform: Platform) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("{}, clamping to the accepted range", e);
        }

        let filter = Arc::new(config.load_filter());
        if !filter.is_empty() {
            log::info!("Instrumenting entry points matching {} filter fragments", filter.len());
        }

        let globals = Arc::new(GlobalCounters::new());
        let trace = Arc::new(TraceLog::new(platform.sink, Arc::clone(&platform.clock)));
        let settings = config.install_settings();

        let installer = |family: &'static FamilyDescriptor,
                         library: Box<dyn DriverLibrary>,
                         table: Arc<dyn FunctionTable>| {
            let interceptor = Interceptor::new(
                family,
                InterceptorParts {
                    registry: Arc::new(Registry::new(config.registry_capacity())),
                    table,
                    clock: Arc::clone(&platform.clock),
                    trace: Arc::clone(&trace),
                    globals: Arc::clone(&globals),
                },
            );
            Installer::new(Arc::new(interceptor), library, Arc::clone(&filter), settings)
        };

        let ogles2 = installer(&OGLES2, platform.ogles2_library, platform.ogles2_table);
        let nova = installer(&NOVA, platform.nova_library, platform.nova_table);

        Self {
            config,
            globals,
            ogles2,
            nova,
        }
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &SnoopConfig {
        &self.config
    }

    // ========== Families ==========

    /// Start instrumenting new OGLES2 interfaces
    pub fn install_ogles(&self) -> Result<()> {
        self.ogles2.install()
    }

    /// Restore every OGLES2 interface and stop instrumenting
    pub fn remove_ogles(&self) {
        self.ogles2.remove();
    }

    /// Start instrumenting new Nova contexts
    ///
    /// Call tracing begins `start_delay_secs` after install and lasts
    /// `duration_secs`, 0 meaning until removal. Profiling is not affected.
    pub fn install_nova(&self, start_delay_secs: u64, duration_secs: u64) -> Result<()> {
        let was_active = self.nova.is_active();
        self.nova.install()?;

        if !was_active {
            let interceptor = self.nova.interceptor();
            interceptor.window().schedule(
                interceptor.clock().as_ref(),
                Duration::from_secs(start_delay_secs),
                Duration::from_secs(duration_secs),
            );
            if start_delay_secs > 0 || duration_secs > 0 {
                log::info!(
                    "Warp3DNova: tracing starts in {} s, duration {} s (0 = until removed)",
                    start_delay_secs,
                    duration_secs
                );
            }
        }
        Ok(())
    }

    /// Restore every Nova context and stop instrumenting
    pub fn remove_nova(&self) {
        self.nova.remove();
        self.nova.interceptor().window().clear();
    }

    /// Install both families with the configured Nova trace window
    ///
    /// Both installs are attempted; the first failure is returned.
    pub fn install_configured(&self) -> Result<()> {
        let ogles2 = self.install_ogles();
        let nova = self.install_nova(self.config.nova.start_delay_secs, self.config.nova.duration_secs);
        ogles2.and(nova)
    }

    /// Remove both families
    pub fn remove_all(&self) {
        self.remove_ogles();
        self.remove_nova();
    }

    // ========== Profiling ==========

    /// Begin a profiling run: re-base every live context
    pub fn start_profiling(&self) {
        if self.globals.is_active() {
            log::debug!("Profiling already running");
            return;
        }

        self.globals.start();
        self.ogles2.restart_profiling();
        self.nova.restart_profiling();
        log::info!("Profiling started");
    }

    /// End the profiling run and report every live context
    pub fn finish_profiling(&self) {
        if !self.globals.finish() {
            log::debug!("Profiling not running");
            return;
        }

        self.ogles2.report_all();
        self.nova.report_all();
        log::info!("Profiling finished");
    }

    /// Whether a profiling run is in progress
    pub fn is_profiling(&self) -> bool {
        self.globals.is_active()
    }

    // ========== Status ==========

    /// Name and version
    pub fn version_string(&self) -> &'static str {
        concat!("snoop ", env!("CARGO_PKG_VERSION"))
    }

    /// Global error tally: failed statuses, polled errors and null results
    pub fn error_count_string(&self) -> String {
        format!("Errors: {}", self.globals.errors())
    }

    /// OGLES2 interceptor, for the platform trampolines
    pub fn ogles2(&self) -> &Arc<Interceptor> {
        self.ogles2.interceptor()
    }

    /// Nova interceptor, for the platform trampolines
    pub fn nova(&self) -> &Arc<Interceptor> {
        self.nova.interceptor()
    }

    /// Shared global counters
    pub fn globals(&self) -> &Arc<GlobalCounters> {
        &self.globals
    }
}

impl Drop for Snoop {
    fn drop(&mut self) {
        self.remove_all();
    }
}
