//! Client context registry
//!
//! Fixed-capacity table of client contexts keyed by the client's native
//! handle. A single lock guards the slot table; it is held for O(capacity)
//! scans only, never across a call into the driver. Lookups hand out an
//! `Arc`, so a context stays valid for a call in flight even if its slot is
//! released meanwhile.
//!
//! # Invariants
//!
//! 1. At most one occupied slot per handle
//! 2. A full table refuses new clients; it never evicts
//! 3. A slot is reused only after it was explicitly released

use crate::context::ClientContext;
use crate::error::{Result, SnoopError};
use crate::platform::ClientHandle;
use parking_lot::Mutex;
use std::sync::Arc;

/// Default number of client slots per driver family
pub const DEFAULT_CAPACITY: usize = 32;

/// Fixed-capacity table of live client contexts
#[derive(Debug)]
pub struct Registry {
    slots: Mutex<Vec<Option<Arc<ClientContext>>>>,
    capacity: usize,
}

impl Registry {
    /// Create a registry with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; capacity]),
            capacity,
        }
    }

    /// Store a context in a free slot
    pub fn try_insert(&self, context: ClientContext) -> Result<Arc<ClientContext>> {
        let mut slots = self.slots.lock();

        let handle = context.handle();
        if slots.iter().flatten().any(|c| c.handle() == handle) {
            return Err(SnoopError::AlreadyRegistered(handle));
        }

        let free = slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(SnoopError::RegistryFull { capacity: self.capacity })?;

        let context = Arc::new(context);
        *free = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Find the context of a client
    pub fn find(&self, handle: ClientHandle) -> Option<Arc<ClientContext>> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .find(|c| c.handle() == handle)
            .cloned()
    }

    /// Release the slot of a client; a second call is a no-op
    pub fn remove(&self, handle: ClientHandle) -> Option<Arc<ClientContext>> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(c) if c.handle() == handle))
            .and_then(Option::take)
    }

    /// Visit every live context with the lock held for the whole traversal
    pub fn for_each(&self, mut f: impl FnMut(&Arc<ClientContext>)) {
        let slots = self.slots.lock();
        for context in slots.iter().flatten() {
            f(context);
        }
    }

    /// Release every slot, visiting each context with the lock held
    pub fn drain(&self, mut f: impl FnMut(Arc<ClientContext>)) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if let Some(context) = slot.take() {
                f(context);
            }
        }
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// Whether no client is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
