//! The current-reslist binding: "where does a newly allocated resource go?"
//!
//! This is a single process-wide slot, not a stack, guarded by the
//! single-threaded invariant the rest of the runtime assumes (`spec.md` §5).
//! It is implemented as a `thread_local!` rather than a bare `static`
//! because Rust has no unsynchronized process-wide mutable state without
//! `unsafe`; a single-threaded embedder only ever touches it from its one
//! thread, so this is the same guarantee the source relies on.
//!
//! Only two disciplined operations may change it: [`ScopedReslist`] (create
//! a new reslist, make it current, destroy it on scope exit) and
//! [`CurrentReslistGuard`] (temporarily rebind to an existing reslist).
//! Both restore the prior binding on every exit path, including unwind,
//! because they do so in `Drop`.

use std::cell::RefCell;

use crate::resource::Reslist;

thread_local! {
    static CURRENT: RefCell<Reslist> = RefCell::new(Reslist::new_root());
}

/// The reslist new allocations are currently registered against.
pub fn current() -> Reslist {
    CURRENT.with(|c| c.borrow().clone())
}

fn set_current(rl: Reslist) {
    CURRENT.with(|c| *c.borrow_mut() = rl);
}

/// `SCOPED_RESLIST`: creates a new reslist as a child of whatever is
/// current, makes it current, and destroys it (running its cleanups) when
/// this guard is dropped — on any exit path, including an unwind from
/// `die`.
pub struct ScopedReslist {
    prev: Reslist,
    rl: Reslist,
    finished: bool,
}

impl ScopedReslist {
    pub fn new() -> Self {
        let prev = current();
        let rl = prev.create_scoped_child();
        set_current(rl.clone());
        ScopedReslist {
            prev,
            rl,
            finished: false,
        }
    }

    /// The reslist this scope made current.
    pub fn reslist(&self) -> Reslist {
        self.rl.clone()
    }

    /// Restores the prior current-reslist binding and destroys this scope's
    /// reslist early (running its cleanups now rather than at `Drop`).
    /// Idempotent: calling it and then letting the guard drop is safe.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        set_current(self.prev.clone());
        self.rl.clone().destroy();
    }
}

impl Default for ScopedReslist {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedReslist {
    fn drop(&mut self) {
        self.finish();
    }
}

/// `WITH_CURRENT_RESLIST`: temporarily rebinds current to an existing
/// reslist (not a newly created one). On drop, restores the prior binding;
/// the target reslist is *not* destroyed.
pub struct CurrentReslistGuard {
    prev: Reslist,
}

impl CurrentReslistGuard {
    pub fn new(target: &Reslist) -> Self {
        let prev = current();
        set_current(target.clone());
        CurrentReslistGuard { prev }
    }
}

impl Drop for CurrentReslistGuard {
    fn drop(&mut self) {
        set_current(self.prev.clone());
    }
}
