//! Per-walk record of the objects already seen.

use std::collections::HashSet;

use crate::{Anchor, Identity};

/// Identity set scoped to one top-level walk.
///
/// Entries are never removed while the walk runs, so an object reached
/// through two sibling branches is reported as a repeat the second time,
/// the same way a true cycle is.
///
/// Anchors handed to [`Ledger::visit`] are held until the ledger is dropped,
/// so an address cannot be freed and reused by another object mid-walk.
#[derive(Debug, Default)]
pub struct Ledger {
    seen: HashSet<Identity>,
    anchors: Vec<Anchor>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity`, holding on to `anchor` if there is one. Returns
    /// `false` if the identity was already recorded.
    pub fn visit(&mut self, identity: Identity, anchor: Option<Anchor>) -> bool {
        if !self.seen.insert(identity) {
            return false;
        }
        self.anchors.extend(anchor);
        true
    }

    /// Whether `identity` has been recorded.
    pub fn contains(&self, identity: Identity) -> bool {
        self.seen.contains(&identity)
    }

    /// Number of recorded identities.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn second_visit_is_reported() {
        let mut ledger = Ledger::new();
        let id = Identity::of(42usize);
        assert!(ledger.visit(id, None));
        assert!(!ledger.visit(id, None));
        assert!(ledger.contains(id));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn anchors_live_as_long_as_the_ledger() {
        let value: Rc<Vec<u8>> = Rc::new(vec![1, 2]);
        let mut ledger = Ledger::new();
        assert!(ledger.visit(Identity::of(1usize), Some(value.clone() as Anchor)));
        assert_eq!(Rc::strong_count(&value), 2);

        // A repeat does not hold a second handle.
        assert!(!ledger.visit(Identity::of(1usize), Some(value.clone() as Anchor)));
        assert_eq!(Rc::strong_count(&value), 2);

        drop(ledger);
        assert_eq!(Rc::strong_count(&value), 1);
    }
}
