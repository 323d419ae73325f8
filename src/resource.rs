//! Reslist tree and cleanup slots.
//!
//! A [`Reslist`] owns an ordered list of resources: child reslists and
//! cleanup slots, most-recently-inserted first. Destruction walks that list
//! head to tail, so cleanups run in reverse order of insertion.
//!
//! Internally a reslist's children are kept in a `Vec` used as a stack:
//! `push` appends ("inserts at the head"), and destruction `pop`s ("walks
//! from the head"). This gives LIFO order for free from ordinary
//! `Vec::push`/`Vec::pop` without needing an explicit linked-list dance.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::verify;

enum Resource {
    Reslist(Rc<ReslistInner>),
    Cleanup(Rc<CleanupInner>),
}

impl Resource {
    fn same_cleanup(&self, target: &Rc<CleanupInner>) -> bool {
        matches!(self, Resource::Cleanup(c) if Rc::ptr_eq(c, target))
    }

    fn same_reslist(&self, target: &Rc<ReslistInner>) -> bool {
        matches!(self, Resource::Reslist(r) if Rc::ptr_eq(r, target))
    }
}

struct ReslistInner {
    parent: RefCell<Option<Weak<ReslistInner>>>,
    children: RefCell<Vec<Resource>>,
    /// Mirrors the C `RESLIST_ON_HEAP` / `RESLIST_ON_STACK` discriminator:
    /// heap-kind reslists are `reslist_create`d explicitly; stack-kind ones
    /// back a `ScopedReslist`. Rust's allocator frees either kind's own
    /// storage the same way (it's an `Rc`), so the flag is kept only to
    /// preserve the documented distinction, not because it changes teardown.
    on_heap: Cell<bool>,
}

/// A scope-owned, ordered collection of deferred cleanup actions and owned
/// child reslists. Cheap to clone (it's a reference-counted handle).
#[derive(Clone)]
pub struct Reslist(Rc<ReslistInner>);

impl Reslist {
    /// Constructs the process-root reslist. Has no parent.
    pub(crate) fn new_root() -> Self {
        Reslist(Rc::new(ReslistInner {
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            on_heap: Cell::new(false),
        }))
    }

    /// `reslist_create`: a new, heap-owned reslist, linked as a child (head)
    /// of `self`.
    pub fn create_child(&self) -> Reslist {
        self.new_child(true)
    }

    /// Backs `ScopedReslist`: a new, stack-owned reslist, linked as a child
    /// (head) of `self`.
    pub(crate) fn create_scoped_child(&self) -> Reslist {
        self.new_child(false)
    }

    fn new_child(&self, on_heap: bool) -> Reslist {
        let child = Rc::new(ReslistInner {
            parent: RefCell::new(Some(Rc::downgrade(&self.0))),
            children: RefCell::new(Vec::new()),
            on_heap: Cell::new(on_heap),
        });
        self.0
            .children
            .borrow_mut()
            .push(Resource::Reslist(Rc::clone(&child)));
        Reslist(child)
    }

    /// `reslist_destroy`: runs every owned resource's destructor, head to
    /// tail (i.e. most-recently-inserted first). Reslists recurse; cleanups
    /// invoke their committed function (uncommitted ones are just dropped).
    /// Also detaches `self` from its parent, so the parent's child list
    /// never holds a reference to an already-torn-down reslist.
    pub fn destroy(self) {
        if let Some(parent) = self.0.parent.borrow().as_ref().and_then(Weak::upgrade) {
            let mut children = parent.children.borrow_mut();
            if let Some(pos) = children.iter().position(|r| r.same_reslist(&self.0)) {
                children.remove(pos);
            }
        }
        Self::destroy_inner(&self.0);
    }

    fn destroy_inner(inner: &Rc<ReslistInner>) {
        loop {
            let next = inner.children.borrow_mut().pop();
            match next {
                Some(Resource::Reslist(child)) => Self::destroy_inner(&child),
                Some(Resource::Cleanup(slot)) => run_cleanup(&slot),
                None => break,
            }
        }
    }

    /// `reslist_xfer`: splice `donor`'s children, in order, to the head of
    /// `recipient`'s children. `donor` is left empty; its node itself is
    /// untouched (the caller typically destroys it right after).
    pub fn xfer(recipient: &Reslist, donor: &Reslist) {
        let drained: Vec<Resource> = donor.0.children.borrow_mut().drain(..).collect();
        for resource in &drained {
            match resource {
                Resource::Reslist(child) => {
                    *child.parent.borrow_mut() = Some(Rc::downgrade(&recipient.0));
                }
                Resource::Cleanup(slot) => {
                    *slot.owner.borrow_mut() = Rc::downgrade(&recipient.0);
                }
            }
        }
        recipient.0.children.borrow_mut().extend(drained);
    }

    pub(crate) fn ptr_eq(&self, other: &Reslist) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn push_cleanup(&self, slot: Rc<CleanupInner>) {
        self.0.children.borrow_mut().push(Resource::Cleanup(slot));
    }

    /// Removes `slot` from wherever it currently lives in this reslist's
    /// child list. Used by both `cleanup_commit` (remove-then-repush at
    /// head) and `cleanup_forget` (remove and discard).
    fn remove_cleanup(&self, slot: &Rc<CleanupInner>) -> bool {
        let mut children = self.0.children.borrow_mut();
        if let Some(pos) = children.iter().position(|r| r.same_cleanup(slot)) {
            children.remove(pos);
            true
        } else {
            false
        }
    }
}

fn run_cleanup(slot: &Rc<CleanupInner>) {
    if let Some(action) = slot.action.borrow_mut().take() {
        action();
    }
}

type CleanupAction = Box<dyn FnOnce() + 'static>;

struct CleanupInner {
    owner: RefCell<Weak<ReslistInner>>,
    action: RefCell<Option<CleanupAction>>,
    committed: Cell<bool>,
}

/// A single deferred action owned by a reslist; uncommitted until
/// [`cleanup_commit`] installs the function to run.
///
/// Allocate one of these *before* acquiring the resource it will free: if
/// the resource acquisition itself fails, the uncommitted slot is simply
/// freed by the reslist's teardown and nothing runs.
pub struct CleanupSlot(Rc<CleanupInner>);

/// `cleanup_allocate`: allocates a new, uncommitted cleanup slot at the head
/// of `reslist`.
pub fn cleanup_allocate(reslist: &Reslist) -> CleanupSlot {
    let inner = Rc::new(CleanupInner {
        owner: RefCell::new(Rc::downgrade(&reslist.0)),
        action: RefCell::new(None),
        committed: Cell::new(false),
    });
    reslist.push_cleanup(Rc::clone(&inner));
    CleanupSlot(inner)
}

/// `cleanup_commit`: installs `action` into a previously allocated slot and
/// re-inserts it at the head of its owning reslist, so it's the last thing
/// to run before the cleanups that were committed earlier. Infallible; a
/// second commit on the same slot, or a commit on a slot whose owning
/// reslist no longer exists, is a programming error (not a condition a
/// correct caller can trigger) and is caught by `verify!` like every other
/// invariant in this module: it panics in debug builds and is a silent
/// no-op in release rather than a hard crash.
pub fn cleanup_commit<F: FnOnce() + 'static>(slot: &CleanupSlot, action: F) {
    verify!(!slot.0.committed.get());
    let Some(owner) = slot.0.owner.borrow().upgrade() else {
        verify!(false);
        return;
    };
    let owner = Reslist(owner);
    let was_present = owner.remove_cleanup(&slot.0);
    verify!(was_present);
    *slot.0.action.borrow_mut() = Some(Box::new(action));
    slot.0.committed.set(true);
    owner.push_cleanup(Rc::clone(&slot.0));
}

/// `cleanup_forget`: removes the slot from its reslist and frees its
/// storage without invoking the function, even if committed.
pub fn cleanup_forget(slot: CleanupSlot) {
    if let Some(owner) = slot.0.owner.borrow().upgrade() {
        Reslist(owner).remove_cleanup(&slot.0);
    }
    // Dropping `slot` here drops the `Rc<CleanupInner>`; `action` (if any)
    // is dropped without being called.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    fn order_tracker() -> (StdRc<StdRefCell<Vec<&'static str>>>, impl Fn(&StdRc<StdRefCell<Vec<&'static str>>>, &'static str)) {
        (
            StdRc::new(StdRefCell::new(Vec::new())),
            |log: &StdRc<StdRefCell<Vec<&'static str>>>, name: &'static str| log.borrow_mut().push(name),
        )
    }

    #[test]
    fn lifo_cleanup_order() {
        let root = Reslist::new_root();
        let (log, record) = order_tracker();

        for name in ["c1", "c2", "c3"] {
            let slot = cleanup_allocate(&root);
            let log = StdRc::clone(&log);
            cleanup_commit(&slot, move || record(&log, name));
        }

        root.destroy();
        assert_eq!(*log.borrow(), vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn uncommitted_slot_is_inert() {
        let root = Reslist::new_root();
        let ran = StdRc::new(StdRefCell::new(false));
        let slot = cleanup_allocate(&root);
        let _ = &slot; // allocated, never committed
        root.destroy();
        assert!(!*ran.borrow());
    }

    #[test]
    fn cleanup_forget_does_not_run_action() {
        let root = Reslist::new_root();
        let ran = StdRc::new(StdRefCell::new(false));
        let ran2 = StdRc::clone(&ran);
        let slot = cleanup_allocate(&root);
        cleanup_commit(&slot, move || *ran2.borrow_mut() = true);
        cleanup_forget(slot);
        root.destroy();
        assert!(!*ran.borrow());
    }

    #[test]
    #[should_panic]
    fn double_commit_panics_in_debug() {
        let root = Reslist::new_root();
        let slot = cleanup_allocate(&root);
        cleanup_commit(&slot, || {});
        cleanup_commit(&slot, || {});
    }

    #[test]
    #[should_panic]
    fn commit_after_owner_destroyed_panics_in_debug() {
        let root = Reslist::new_root();
        let child = root.create_child();
        let slot = cleanup_allocate(&child);
        child.destroy();
        cleanup_commit(&slot, || {});
    }

    #[test]
    fn xfer_preserves_order() {
        // R has [r1, r2] committed in that order (r2 is head/most recent).
        // D has [d1, d2] similarly. After xfer(R, D), destroying R must
        // invoke d2, d1, r2, r1 in that order.
        let root = Reslist::new_root();
        let recipient = root.create_child();
        let donor = root.create_child();
        let (log, record) = order_tracker();

        for (rl, name) in [(&recipient, "r1"), (&recipient, "r2")] {
            let slot = cleanup_allocate(rl);
            let log = StdRc::clone(&log);
            cleanup_commit(&slot, move || record(&log, name));
        }
        for (rl, name) in [(&donor, "d1"), (&donor, "d2")] {
            let slot = cleanup_allocate(rl);
            let log = StdRc::clone(&log);
            cleanup_commit(&slot, move || record(&log, name));
        }

        Reslist::xfer(&recipient, &donor);
        donor.destroy();
        recipient.destroy();

        assert_eq!(*log.borrow(), vec!["d2", "d1", "r2", "r1"]);
    }

    #[test]
    fn nested_reslist_destroyed_before_parent_resources() {
        let root = Reslist::new_root();
        let (log, record) = order_tracker();

        let inner_log = StdRc::clone(&log);
        let outer_slot = cleanup_allocate(&root);
        cleanup_commit(&outer_slot, move || record(&inner_log, "outer"));

        let child = root.create_child();
        let child_log = StdRc::clone(&log);
        let child_slot = cleanup_allocate(&child);
        cleanup_commit(&child_slot, move || record(&child_log, "inner"));

        root.destroy();
        assert_eq!(*log.borrow(), vec!["inner", "outer"]);
    }
}
