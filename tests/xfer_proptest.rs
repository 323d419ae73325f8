//! Property test for invariant 6: `xfer` preserves relative order within
//! both the recipient's and the donor's existing children, and the donor's
//! entries all end up ahead of (destroyed before) the recipient's.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use reslist::resource::{cleanup_allocate, cleanup_commit, Reslist};

fn run_xfer_case(recipient_len: usize, donor_len: usize) -> Vec<String> {
    let root = Reslist::new_root();
    let recipient = root.create_child();
    let donor = root.create_child();
    let log = Rc::new(RefCell::new(Vec::new()));

    for i in 0..recipient_len {
        let slot = cleanup_allocate(&recipient);
        let log = Rc::clone(&log);
        let label = format!("r{i}");
        cleanup_commit(&slot, move || log.borrow_mut().push(label));
    }
    for i in 0..donor_len {
        let slot = cleanup_allocate(&donor);
        let log = Rc::clone(&log);
        let label = format!("d{i}");
        cleanup_commit(&slot, move || log.borrow_mut().push(label));
    }

    Reslist::xfer(&recipient, &donor);
    donor.destroy();
    recipient.destroy();

    Rc::try_unwrap(log).unwrap().into_inner()
}

proptest! {
    #[test]
    fn xfer_runs_all_donor_entries_before_all_recipient_entries(
        recipient_len in 0usize..8,
        donor_len in 0usize..8,
    ) {
        let order = run_xfer_case(recipient_len, donor_len);
        prop_assert_eq!(order.len(), recipient_len + donor_len);

        let donor_boundary = order.iter().position(|s| s.starts_with('r')).unwrap_or(order.len());
        prop_assert!(order[..donor_boundary].iter().all(|s| s.starts_with('d')));
        prop_assert!(order[donor_boundary..].iter().all(|s| s.starts_with('r')));

        let donor_part: Vec<_> = order[..donor_boundary].to_vec();
        let expected_donor: Vec<_> = (0..donor_len).rev().map(|i| format!("d{i}")).collect();
        prop_assert_eq!(donor_part, expected_donor);

        let recipient_part: Vec<_> = order[donor_boundary..].to_vec();
        let expected_recipient: Vec<_> = (0..recipient_len).rev().map(|i| format!("r{i}")).collect();
        prop_assert_eq!(recipient_part, expected_recipient);
    }
}
