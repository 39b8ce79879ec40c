//! Entry-point name filter
//!
//! Decides at patch time which entry points get wrapped. The filter is a
//! list of case-sensitive name fragments; an entry point is instrumented if
//! its name contains any fragment. An empty filter instruments everything.
//!
//! # Filter Format
//!
//! ```text
//! # one fragment per line, cut at the first ' ', '#' or ';'
//! Draw
//! Bind       ; matches glBindTexture, glBindBuffer, ...
//! W3DN_Submit
//! ```
//!
//! The filter is loaded once before interception starts and is immutable
//! afterwards; it is never consulted on the call path.

use crate::error::Result;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Maximum number of fragment lines kept from a filter source
pub const MAX_FILTERS: usize = 256;

/// Characters that terminate a fragment
const TERMINATORS: [char; 4] = [' ', '\n', '#', ';'];

/// Ordered, capacity-bounded set of name fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    fragments: Vec<String>,
}

impl FilterSet {
    /// Filter that matches every name
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse filter lines from a string
    pub fn parse(source: &str) -> Self {
        let mut set = Self::new();
        for line in source.lines() {
            set.add_line(line);
        }
        set
    }

    /// Parse filter lines from a reader
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut set = Self::new();
        for line in reader.lines() {
            set.add_line(&line?);
        }
        Ok(set)
    }

    /// Load a filter file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let set = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "Loaded {} filter fragment(s) from {}",
            set.len(),
            path.as_ref().display()
        );
        Ok(set)
    }

    /// Load a filter file, falling back to the empty filter
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(set) => set,
            Err(e) => {
                log::warn!(
                    "Filter file {} not usable ({}), instrumenting everything",
                    path.as_ref().display(),
                    e
                );
                Self::new()
            }
        }
    }

    fn add_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        let fragment = match line.find(&TERMINATORS[..]) {
            Some(end) => &line[..end],
            None => line,
        };

        // Repeated fragments still take a slot
        if fragment.is_empty() || self.fragments.len() >= MAX_FILTERS {
            return;
        }

        self.fragments.push(fragment.to_string());
    }

    /// Whether `name` should be instrumented
    pub fn matches(&self, name: &str) -> bool {
        self.fragments.is_empty() || self.fragments.iter().any(|f| name.contains(f.as_str()))
    }

    /// Number of fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragments in encounter order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}
