//! Reentrant exclusive ownership of a context.
//!
//! One thread owns the lock at a time. The owner may enter again without
//! blocking; every entry is paired with one `leave`. When the depth drops to
//! zero the owner keeps the lock until it calls `unlock`, so it can unbind
//! the surface before another thread gets in.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::errors::{InteropError, Result};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Outcome of [`ContextLock::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    /// The lock was free (or just released) and is now owned by this thread.
    Acquired,
    /// This thread already owned the lock.
    Reentered,
}

#[derive(Debug, Default)]
pub(crate) struct ContextLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ContextLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until the calling thread owns the lock, then increments the depth.
    pub(crate) fn enter(&self) -> Entry {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
            return Entry::Reentered;
        }
        while state.owner.is_some() {
            self.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = 1;
        Entry::Acquired
    }

    /// Decrements the depth. Returns `true` when it reached zero, in which
    /// case the caller must finish with [`unlock`](Self::unlock).
    pub(crate) fn leave(&self) -> Result<bool> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) || state.depth == 0 {
            return Err(InteropError::DetachWithoutCurrent);
        }
        state.depth -= 1;
        Ok(state.depth == 0)
    }

    /// Releases ownership after the depth reached zero.
    pub(crate) fn unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) && state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }

    /// Whether the calling thread has entered and not yet fully left.
    #[must_use]
    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        let state = self.state.lock();
        state.owner == Some(thread::current().id()) && state.depth > 0
    }

    /// Entry depth of the calling thread, zero when it does not own the lock.
    #[must_use]
    pub(crate) fn depth(&self) -> usize {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.depth
        } else {
            0
        }
    }
}
