//! Turning [`ViewNode`] trees into text lines.

use core::fmt::{self, Write};

use crate::{NodeKind, ViewNode};

/// Marker written before the summary of a repeated/cyclic reference.
pub const CYCLE_MARKER: &str = "<cycle>";
/// Marker written before the summary of a value cut off by a budget.
pub const TRUNCATED_MARKER: &str = "<truncated>";
/// Marker written before the diagnostic of a failed access.
pub const ERROR_MARKER: &str = "<error>";

/// Renders view trees, one line per node, children indented one unit deeper.
///
/// ```text
/// point: Point
///   x: 1
///   y: 2
///   next: <cycle> Point #1f03a2c4
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Renderer {
    /// usize::MAX is a special value that means indenting with tabs instead of spaces
    indent_size: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self { indent_size: 2 }
    }
}

impl Renderer {
    /// A renderer indenting with two spaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the indentation size (`usize::MAX` indents with tabs).
    pub fn with_indent_size(mut self, size: usize) -> Self {
        self.indent_size = size;
        self
    }

    /// Render `node` into lines.
    pub fn render(&self, node: &ViewNode) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_node(node, 0, true, &mut lines);
        lines
    }

    /// Render `node` without its own label: the first line is just the root's
    /// summary.
    pub fn render_unlabelled(&self, node: &ViewNode) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_node(node, 0, false, &mut lines);
        lines
    }

    /// Render `node` into a writer, lines separated by `\n`.
    pub fn render_to(&self, node: &ViewNode, f: &mut dyn Write) -> fmt::Result {
        for (idx, line) in self.render(node).iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }

    fn render_node(&self, node: &ViewNode, depth: usize, labelled: bool, lines: &mut Vec<String>) {
        let mut line = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_line(&mut line, node, depth, labelled);
        lines.push(line);

        if node.kind.has_children() {
            for child in &node.children {
                self.render_node(child, depth + 1, true, lines);
            }
        }
    }

    fn write_line(
        &self,
        f: &mut dyn Write,
        node: &ViewNode,
        depth: usize,
        labelled: bool,
    ) -> fmt::Result {
        self.indent(f, depth)?;
        if labelled {
            write!(f, "{}: ", node.label)?;
        }
        match node.kind {
            NodeKind::Leaf | NodeKind::Container | NodeKind::Mapping | NodeKind::Composite => {
                write!(f, "{}", node.summary)
            }
            NodeKind::CycleRef => write!(f, "{CYCLE_MARKER} {}", node.summary),
            NodeKind::Truncated => write!(f, "{TRUNCATED_MARKER} {}", node.summary),
            NodeKind::Error => write!(f, "{ERROR_MARKER} {}", node.summary),
        }
    }

    fn indent(&self, f: &mut dyn Write, indent: usize) -> fmt::Result {
        if self.indent_size == usize::MAX {
            write!(f, "{:\t<width$}", "", width = indent)
        } else {
            write!(f, "{: <width$}", "", width = self.indent_width(indent))
        }
    }

    /// Columns of padding for nesting level `indent`, in spaces.
    fn indent_width(&self, indent: usize) -> usize {
        indent.saturating_mul(self.indent_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ViewNode {
        ViewNode {
            label: "p".into(),
            kind: NodeKind::Composite,
            summary: "Point".into(),
            children: vec![
                ViewNode::leaf("x", NodeKind::Leaf, "1"),
                ViewNode {
                    label: "tags".into(),
                    kind: NodeKind::Container,
                    summary: "list [2]".into(),
                    children: vec![
                        ViewNode::leaf("[0]", NodeKind::Truncated, "Tag {…}"),
                        ViewNode::leaf("[1]", NodeKind::CycleRef, "Point #0000beef"),
                    ],
                },
                ViewNode::leaf("area", NodeKind::Error, "boom"),
            ],
        }
    }

    #[test]
    fn one_line_per_node_with_markers() {
        assert_eq!(
            Renderer::new().render(&sample()),
            vec![
                "p: Point",
                "  x: 1",
                "  tags: list [2]",
                "    [0]: <truncated> Tag {…}",
                "    [1]: <cycle> Point #0000beef",
                "  area: <error> boom",
            ]
        );
    }

    #[test]
    fn tabs_and_custom_width() {
        let node = sample();
        let tabs = Renderer::new().with_indent_size(usize::MAX).render(&node);
        assert_eq!(tabs[3], "\t\t[0]: <truncated> Tag {…}");
        let four = Renderer::new().with_indent_size(4).render(&node);
        assert_eq!(four[1], "    x: 1");
    }

    #[test]
    fn huge_indent_sizes_saturate() {
        let renderer = Renderer::new().with_indent_size(usize::MAX / 2);
        assert_eq!(renderer.indent_width(0), 0);
        assert_eq!(renderer.indent_width(1), usize::MAX / 2);
        assert_eq!(renderer.indent_width(3), usize::MAX);

        let leaf = ViewNode::leaf("n", NodeKind::Leaf, "1");
        assert_eq!(renderer.render(&leaf), ["n: 1"]);
    }

    #[test]
    fn display_joins_lines() {
        let text = sample().to_string();
        assert_eq!(text.lines().count(), 6);
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn unlabelled_root() {
        let lines = Renderer::new().render_unlabelled(&sample());
        assert_eq!(lines[0], "Point");
        assert_eq!(lines[1], "  x: 1");

        let error = ViewNode::leaf("r", NodeKind::Error, "bad");
        assert_eq!(Renderer::new().render_unlabelled(&error), vec!["<error> bad"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let node = sample();
        assert_eq!(Renderer::new().render(&node), Renderer::new().render(&node));
    }
}
