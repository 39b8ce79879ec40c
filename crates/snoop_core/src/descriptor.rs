//! Per-function descriptor tables
//!
//! A driver family is data: an ordered table of entry points, each with the
//! post-condition the interceptor runs after the call. A [`FunctionId`] is
//! simply the index of a descriptor in its family's table, which is what
//! the [`entry_points!`](crate::entry_points) macro guarantees.

use std::fmt;

/// Index of an entry point within its family's descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u16);

impl FunctionId {
    /// Table index
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Check applied to a call's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCheck {
    /// Result is not inspected
    None,
    /// A null pointer result counts as a null result and a global error
    Null,
    /// Any status other than `success` counts as an error
    Status { success: u32 },
    /// Null result or, failing that, a status other than `success` from
    /// the error out parameter; a call counts at most one error
    NullOrStatus { success: u32 },
}

/// What a call means for the throughput figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Ordinary state or resource call
    Plain,
    /// Draw call; feeds the primitive counter
    Draw,
    /// Swap/present/submit; marks a frame boundary
    Frame,
}

/// Static description of one entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Native entry-point name
    pub name: &'static str,
    /// Result post-condition
    pub check: ResultCheck,
    /// Throughput role
    pub role: CallRole,
}

impl FunctionDescriptor {
    /// Entry point without post-conditions
    pub const fn plain(name: &'static str) -> Self {
        Self { name, check: ResultCheck::None, role: CallRole::Plain }
    }

    /// Pointer-returning entry point
    pub const fn null_check(name: &'static str) -> Self {
        Self { name, check: ResultCheck::Null, role: CallRole::Plain }
    }

    /// Status-returning entry point
    pub const fn status(name: &'static str, success: u32) -> Self {
        Self { name, check: ResultCheck::Status { success }, role: CallRole::Plain }
    }

    /// Draw call
    pub const fn draw(name: &'static str) -> Self {
        Self { name, check: ResultCheck::None, role: CallRole::Draw }
    }

    /// Frame boundary
    pub const fn frame(name: &'static str) -> Self {
        Self { name, check: ResultCheck::None, role: CallRole::Frame }
    }

    /// Replace the result check, keeping the role
    pub const fn with_check(self, check: ResultCheck) -> Self {
        Self { name: self.name, check, role: self.role }
    }
}

/// A driver family: its entry points and error conventions
#[derive(Debug)]
pub struct FamilyDescriptor {
    /// Family name used in logs and reports
    pub name: &'static str,
    /// Descriptor table, indexed by [`FunctionId`]
    pub functions: &'static [FunctionDescriptor],
    /// "Get last error" entry point, polled after every wrapped call
    pub error_poll: Option<FunctionId>,
    /// Code the error poll returns when nothing is pending
    pub success_code: u32,
}

impl FamilyDescriptor {
    /// Number of entry points
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the family has no entry points
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Look up a descriptor
    pub fn descriptor(&self, id: FunctionId) -> Option<&'static FunctionDescriptor> {
        self.functions.get(id.index())
    }

    /// Name of an entry point, `"?"` for an unknown id
    pub fn name_of(&self, id: FunctionId) -> &'static str {
        self.descriptor(id).map(|d| d.name).unwrap_or("?")
    }

    /// Find an entry point by exact name
    pub fn find(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|d| d.name == name)
            .map(|i| FunctionId(i as u16))
    }

    /// All ids with their descriptors, in table order
    pub fn entries(&self) -> impl Iterator<Item = (FunctionId, &'static FunctionDescriptor)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, d)| (FunctionId(i as u16), d))
    }

    /// Whether `id` is the family's error-poll entry point
    pub fn is_error_poll(&self, id: FunctionId) -> bool {
        self.error_poll == Some(id)
    }
}

/// Declare a family's entry points
///
/// Generates a `#[repr(u16)]` enum whose discriminants are the table
/// indices, its `ALL` list, a `From<Enum> for FunctionId` conversion and
/// the static descriptor table.
///
/// ```ignore
/// entry_points! {
///     pub enum DemoFn in DEMO_FUNCTIONS {
///         Clear => FunctionDescriptor::plain("Clear"),
///         Draw => FunctionDescriptor::draw("Draw"),
///     }
/// }
/// ```
#[macro_export]
macro_rules! entry_points {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $table:ident {
            $($variant:ident => $desc:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            /// Every entry point, in table order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Function id of this entry point
            pub const fn id(self) -> $crate::FunctionId {
                $crate::FunctionId(self as u16)
            }

            /// Native name of this entry point
            pub fn name(self) -> &'static str {
                $table[self as usize].name
            }
        }

        impl From<$name> for $crate::FunctionId {
            fn from(f: $name) -> Self {
                f.id()
            }
        }

        $vis static $table: &[$crate::FunctionDescriptor] = &[$($desc),+];
    };
}
