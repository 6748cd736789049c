//! Coordination primitives for the worker choreography.
//!
//! Semaphore-shaped building blocks rendered with `Mutex` + `Condvar`,
//! since guards alone cannot cross threads. A [`Signal`] wakes a worker once
//! per notification, a [`Token`] serializes structural changes to one tier
//! across threads, and a [`Gate`] is the swap barrier writers wait behind
//! while a flush rotates the buffers.

use std::sync::{Condvar, Mutex};

/// Counted wake-up signal: notifications accumulate, each `wait` consumes
/// exactly one.
pub(crate) struct Signal {
    pending: Mutex<u64>,
    cv: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut pending = self.pending.lock().expect("signal lock poisoned");
        *pending += 1;
        self.cv.notify_one();
    }

    /// Blocks until a notification is available, then consumes it.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().expect("signal lock poisoned");
        while *pending == 0 {
            pending = self.cv.wait(pending).expect("signal lock poisoned");
        }
        *pending -= 1;
    }
}

/// Binary token serializing flush-into-tier and compact-into-tier for one
/// tier. Unlike a mutex guard it can be acquired on one thread and released
/// on another, which is how a flush hands a full tier over to the
/// compactor.
pub(crate) struct Token {
    held: Mutex<bool>,
    cv: Condvar,
}

impl Token {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut held = self.held.lock().expect("token lock poisoned");
        while *held {
            held = self.cv.wait(held).expect("token lock poisoned");
        }
        *held = true;
    }

    pub fn release(&self) {
        let mut held = self.held.lock().expect("token lock poisoned");
        *held = false;
        self.cv.notify_one();
    }
}

/// Swap barrier. Raised when a flush is pending; writers block in
/// `wait_clear` until the Flusher has swapped buffers and cleared it.
pub(crate) struct Gate {
    raised: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn raise(&self) {
        *self.raised.lock().expect("gate lock poisoned") = true;
    }

    pub fn clear(&self) {
        let mut raised = self.raised.lock().expect("gate lock poisoned");
        *raised = false;
        self.cv.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.lock().expect("gate lock poisoned")
    }

    /// Blocks while the gate is raised.
    pub fn wait_clear(&self) {
        let mut raised = self.raised.lock().expect("gate lock poisoned");
        while *raised {
            raised = self.cv.wait(raised).expect("gate lock poisoned");
        }
    }
}

/// Completed-cycle counter: lets a foreground caller wait until the Flusher
/// has finished at least `target` cycles.
pub(crate) struct Progress {
    done: Mutex<u64>,
    cv: Condvar,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            done: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn current(&self) -> u64 {
        *self.done.lock().expect("progress lock poisoned")
    }

    pub fn bump(&self) {
        let mut done = self.done.lock().expect("progress lock poisoned");
        *done += 1;
        self.cv.notify_all();
    }

    pub fn wait_past(&self, target: u64) {
        let mut done = self.done.lock().expect("progress lock poisoned");
        while *done < target {
            done = self.cv.wait(done).expect("progress lock poisoned");
        }
    }
}
