//! Depth- and width-bounded traversal producing [`ViewNode`] trees.

use crate::{Capability, Depth, Detail, Entries, Ledger, NodeKind, Probe, ViewNode};

/// Default number of entries shown per sequence or mapping.
pub const DEFAULT_WIDTH: usize = 64;

/// Label of the synthetic node standing in for entries past the width cap.
pub const OVERFLOW_LABEL: &str = "…";

/// Walks values into [`ViewNode`] trees.
///
/// A walker is configuration only; each call to [`Walker::walk`] uses a fresh
/// [`Ledger`], so cycles are detected per top-level call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Walker {
    depth: Depth,
    full: bool,
    width: usize,
}

impl Default for Walker {
    fn default() -> Self {
        Self {
            depth: Depth::default(),
            full: false,
            width: DEFAULT_WIDTH,
        }
    }
}

impl Walker {
    /// A walker with the default depth, public attributes only, and the
    /// default width cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// A walker for the given detail level.
    pub fn from_detail(detail: Detail) -> Self {
        Self::new().with_depth(detail.depth).with_full(detail.full)
    }

    /// Set the depth budget.
    ///
    /// [`Depth::Unbounded`] walks as deep as the value goes. Cycles are still
    /// caught, but nothing else limits recursion.
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    /// Show internal attributes as well.
    pub fn with_full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Cap the number of entries shown per sequence or mapping.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Walk `value` with a fresh ledger.
    pub fn walk(&self, value: &dyn Probe, label: &str) -> ViewNode {
        let mut ledger = Ledger::new();
        self.walk_with(value, label, &mut ledger)
    }

    /// Walk `value`, recording visited objects in `ledger`.
    pub fn walk_with(&self, value: &dyn Probe, label: &str, ledger: &mut Ledger) -> ViewNode {
        self.walk_node(value, label.to_owned(), self.depth, ledger)
    }

    fn walk_node(
        &self,
        value: &dyn Probe,
        label: String,
        budget: Depth,
        ledger: &mut Ledger,
    ) -> ViewNode {
        if let Some(identity) = value.identity()
            && !ledger.visit(identity, value.anchor())
        {
            let summary = format!("{} {identity}", value.type_name());
            return ViewNode::leaf(label, NodeKind::CycleRef, summary);
        }

        let capability = match value.capability() {
            Ok(capability) => capability,
            Err(err) => return ViewNode::leaf(label, NodeKind::Error, err.to_string()),
        };

        if let Capability::Leaf = capability {
            return ViewNode::leaf(label, NodeKind::Leaf, value.summary());
        }
        if budget.is_exhausted() {
            return ViewNode::leaf(label, NodeKind::Truncated, value.summary());
        }

        let next = budget.descend();
        match capability {
            Capability::Mapping(entries) => ViewNode {
                label,
                kind: NodeKind::Mapping,
                summary: value.summary(),
                children: self.walk_entries(entries, next, ledger, true),
            },
            Capability::Sequence(entries) => ViewNode {
                label,
                kind: NodeKind::Container,
                summary: value.summary(),
                children: self.walk_entries(entries, next, ledger, true),
            },
            Capability::Composite(entries) => ViewNode {
                label,
                kind: NodeKind::Composite,
                summary: value.type_name(),
                children: self.walk_entries(entries, next, ledger, false),
            },
            Capability::Leaf => unreachable!("leaves return early"),
        }
    }

    fn walk_entries(
        &self,
        entries: Entries<'_>,
        budget: Depth,
        ledger: &mut Ledger,
        capped: bool,
    ) -> Vec<ViewNode> {
        // Internal entries are dropped before their values are read.
        let mut entries = entries.filter(|entry| self.full || !entry.hidden);
        let mut children = Vec::new();
        let mut omitted = 0;

        while let Some(entry) = entries.next() {
            if capped && children.len() >= self.width {
                omitted = 1 + entries.by_ref().count();
                break;
            }
            let child = match entry.into_parts() {
                (label, Ok(probe)) => self.walk_node(&*probe, label, budget, ledger),
                (label, Err(err)) => ViewNode::leaf(label, NodeKind::Error, err.to_string()),
            };
            children.push(child);
        }

        if omitted > 0 {
            children.push(ViewNode::leaf(
                OVERFLOW_LABEL,
                NodeKind::Truncated,
                format!("{omitted} more entries"),
            ));
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::Obj;

    fn nested() -> Obj {
        Obj::record("Outer").with_attr(
            "a",
            Obj::record("Middle").with_attr("b", Obj::record("Inner").with_attr("c", 1)),
        )
    }

    #[test]
    fn depth_two_truncates_third_level() {
        let view = Walker::new()
            .with_depth(Depth::Limited(2))
            .walk(&nested(), "x");
        let a = view.find("a").unwrap();
        assert_eq!(a.kind, NodeKind::Composite);
        let b = view.find("b").unwrap();
        assert_eq!(b.kind, NodeKind::Truncated);
        assert!(b.children.is_empty());
        assert!(view.find("c").is_none());
    }

    #[test]
    fn budget_zero_on_non_leaf_is_one_truncated_node() {
        let view = Walker::new()
            .with_depth(Depth::Limited(0))
            .walk(&nested(), "x");
        assert_eq!(view.kind, NodeKind::Truncated);
        assert!(view.children.is_empty());
        assert_eq!(view.summary, "Outer {…}");
    }

    #[test]
    fn leaves_survive_an_exhausted_budget() {
        let view = Walker::new()
            .with_depth(Depth::Limited(0))
            .walk(&Obj::int(7), "n");
        assert_eq!(view, ViewNode::leaf("n", NodeKind::Leaf, "7"));
    }

    #[test]
    fn sufficient_budget_has_no_truncation() {
        let view = Walker::new()
            .with_depth(Depth::Limited(3))
            .walk(&nested(), "x");
        assert_eq!(view.count(NodeKind::Truncated), 0);
        assert_eq!(view.iter().count(), 4);
        assert_eq!(view.find("c").unwrap().summary, "1");

        let unbounded = Walker::new().with_depth(Depth::Unbounded).walk(&nested(), "x");
        assert_eq!(unbounded, view);
    }

    #[test]
    fn self_containing_list_has_exactly_one_cycle_ref() {
        let list = Obj::list([Obj::int(1)]);
        list.push(list.clone());
        for depth in [Depth::Limited(1), Depth::Limited(5), Depth::Unbounded] {
            let view = Walker::new().with_depth(depth).walk(&list, "l");
            assert_eq!(view.count(NodeKind::CycleRef), 1, "{depth}");
            let cycle = &view.children[1];
            assert_eq!(cycle.label, "[1]");
            assert_eq!(cycle.kind, NodeKind::CycleRef);
            assert!(cycle.summary.starts_with("list #"));
        }
    }

    #[test]
    fn shared_sibling_is_reported_as_repeat() {
        let shared = Obj::list([Obj::int(1)]);
        let pair = Obj::tuple([shared.clone(), shared]);
        let view = Walker::new().walk(&pair, "pair");
        assert_eq!(view.children[0].kind, NodeKind::Container);
        assert_eq!(view.children[1].kind, NodeKind::CycleRef);
    }

    #[test]
    fn private_attributes_follow_full() {
        let obj = Obj::record("Counter")
            .with_attr("count", 3)
            .with_attr("_track", Obj::none());

        let public = Walker::new().walk(&obj, "c");
        assert!(public.iter().all(|node| !node.label.starts_with('_')));
        assert_eq!(public.children.len(), 1);

        let full = Walker::new().with_full(true).walk(&obj, "c");
        assert!(full.find("_track").is_some());
    }

    #[test]
    fn failing_attribute_does_not_stop_siblings() {
        let obj = Obj::record("Shape")
            .with_attr("sides", 4)
            .with_computed("area", || Err("boom".into()))
            .with_attr("name", "square");
        let view = Walker::new().walk(&obj, "s");
        let kinds: Vec<_> = view.children.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [NodeKind::Leaf, NodeKind::Error, NodeKind::Leaf]);
        assert_eq!(view.find("area").unwrap().summary, "boom");
    }

    #[test]
    fn width_cap_summarises_the_rest() {
        let list = Obj::list((0..10).map(Obj::int));
        let view = Walker::new().with_width(4).walk(&list, "l");
        assert_eq!(view.children.len(), 5);
        let overflow = view.children.last().unwrap();
        assert_eq!(overflow.label, OVERFLOW_LABEL);
        assert_eq!(overflow.kind, NodeKind::Truncated);
        assert_eq!(overflow.summary, "6 more entries");
    }

    #[test]
    fn zero_width_walks_no_entries() {
        let reads = Rc::new(Cell::new(0));
        let list = Obj::list((0..3).map(Obj::int));
        let counted = Obj::record("Counted").with_computed("n", {
            let reads = Rc::clone(&reads);
            move || {
                reads.set(reads.get() + 1);
                Ok(Obj::int(1))
            }
        });
        list.push(counted);

        let view = Walker::new().with_width(0).walk(&list, "l");
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].label, OVERFLOW_LABEL);
        assert_eq!(view.children[0].summary, "4 more entries");
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn width_cap_stops_before_the_next_entry() {
        let list = Obj::list((0..5).map(Obj::int));
        let view = Walker::new().with_width(5).walk(&list, "l");
        assert_eq!(view.children.len(), 5);
        assert_eq!(view.count(NodeKind::Truncated), 0);
    }

    #[test]
    fn fresh_computed_values_are_not_repeats() {
        let obj = Obj::record("Fresh")
            .with_computed("a", || Ok(Obj::list([Obj::int(1)])))
            .with_computed("b", || Ok(Obj::list([Obj::int(2)])))
            .with_computed("c", || Ok(Obj::list([Obj::int(3)])));
        for _ in 0..16 {
            let view = Walker::new().walk(&obj, "f");
            assert_eq!(view.count(NodeKind::CycleRef), 0);
            let kinds: Vec<_> = view.children.iter().map(|c| c.kind).collect();
            assert_eq!(kinds, [NodeKind::Container; 3]);
        }
    }

    #[test]
    fn hidden_computed_attributes_are_read_only_when_full() {
        let reads = Rc::new(Cell::new(0));
        let obj = Obj::record("Guarded").with_attr("open", 1).with_computed("_secret", {
            let reads = Rc::clone(&reads);
            move || {
                reads.set(reads.get() + 1);
                Ok(Obj::str("s3cr3t"))
            }
        });

        let public = Walker::new().walk(&obj, "g");
        assert!(public.find("_secret").is_none());
        assert_eq!(reads.get(), 0);

        let full = Walker::new().with_full(true).walk(&obj, "g");
        assert_eq!(full.find("_secret").unwrap().summary, "\"s3cr3t\"");
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn width_cap_does_not_apply_to_composites() {
        let mut obj = Obj::record("Wide");
        for idx in 0..8 {
            obj = obj.with_attr(format!("f{idx}"), idx);
        }
        let view = Walker::new().with_width(2).walk(&obj, "w");
        assert_eq!(view.children.len(), 8);
    }
}
