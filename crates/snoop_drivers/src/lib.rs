//! # snoop_drivers - Driver Families and Control Surface
//!
//! The two instrumented driver families expressed as data, and [`Snoop`],
//! the engine a front-end drives.
//!
//! | Family | Patched per | Error reporting | Frame boundary |
//! |--------|-------------|-----------------|----------------|
//! | [`ogles2`] | interface | polled `glGetError`, deferred | `aglSwapBuffers` |
//! | [`nova`] | context | return status / out parameter | `W3DN_Submit` |
//!
//! ## Example
//!
//! ```ignore
//! use snoop_drivers::{Platform, Snoop};
//!
//! let snoop = Snoop::new(SnoopConfig::load("snoop.toml")?, platform);
//! snoop.install_ogles()?;
//! snoop.install_nova(5, 10)?;
//! snoop.start_profiling();
//! // ... clients render ...
//! snoop.finish_profiling();
//! println!("{}", snoop.error_count_string());
//! ```

pub mod control;
pub mod nova;
pub mod ogles2;

pub use control::{Platform, Snoop};
pub use nova::{NovaFn, NOVA};
pub use ogles2::{Ogles2Fn, OGLES2};
