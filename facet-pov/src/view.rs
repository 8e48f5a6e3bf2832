//! The bounded tree a walk produces.

use core::fmt;

use crate::Renderer;

/// What a [`ViewNode`] stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A value with nothing to descend into
    Leaf,
    /// Ordered elements
    Container,
    /// Key/value pairs
    Mapping,
    /// Named attributes
    Composite,
    /// An object already visited during this walk
    CycleRef,
    /// A value (or a run of entries) cut off by the depth or width budget
    Truncated,
    /// An attribute or iteration that failed
    Error,
}

impl NodeKind {
    /// Whether nodes of this kind may carry children.
    pub fn has_children(self) -> bool {
        matches!(
            self,
            NodeKind::Container | NodeKind::Mapping | NodeKind::Composite
        )
    }
}

/// One node of a walked value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewNode {
    /// Index, key, attribute name, or the label given at the call site
    pub label: String,
    /// Kind of node
    pub kind: NodeKind,
    /// One-line summary (type, short value, or diagnostic for errors)
    pub summary: String,
    /// Children, in enumeration order. Empty unless `kind.has_children()`.
    pub children: Vec<ViewNode>,
}

impl ViewNode {
    /// A node without children.
    pub fn leaf(label: impl Into<String>, kind: NodeKind, summary: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            summary: summary.into(),
            children: Vec::new(),
        }
    }

    /// Number of nodes of `kind` in this subtree, including `self`.
    pub fn count(&self, kind: NodeKind) -> usize {
        let own = usize::from(self.kind == kind);
        own + self
            .children
            .iter()
            .map(|child| child.count(kind))
            .sum::<usize>()
    }

    /// Depth-first search for the first node with the given label.
    pub fn find(&self, label: &str) -> Option<&ViewNode> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(label))
    }

    /// Iterate over this node and all of its descendants, depth first.
    pub fn iter(&self) -> impl Iterator<Item = &ViewNode> {
        let mut stack = vec![self];
        core::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Renderer::new().render_to(self, f)
    }
}
