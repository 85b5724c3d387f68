//! Preorder traversal over the syntax tree.
//!
//! Downstream consumers (renderers, dump writers) rely on two properties:
//! every node presents a stable identity (its [`NodeId`]) and children are
//! visited in the exact order they were attached. The traversal also hands
//! out a slash-joined path for each node, which gives tests and logs a
//! stable way to name positions in the tree.

use crate::ast::{NodeId, SyntaxTree};

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}/{segment}")
    }
}

/// Visit `node` and its descendants in preorder, children in stored order.
///
/// Each callback receives the node's path: the root's kind label, then one
/// `label.index` segment per ancestor step, e.g.
/// `program/statements.0/assign.0/var.0`.
pub fn walk(tree: &SyntaxTree, node: NodeId, on_node: &mut impl FnMut(&str, NodeId)) {
    let root_path = tree.node(node).kind.label().to_string();
    walk_inner(tree, node, &root_path, on_node);
}

fn walk_inner(
    tree: &SyntaxTree,
    node: NodeId,
    path: &str,
    on_node: &mut impl FnMut(&str, NodeId),
) {
    on_node(path, node);
    for (index, &child) in tree.children(node).iter().enumerate() {
        let segment = format!("{}.{index}", tree.node(child).kind.label());
        walk_inner(tree, child, &join_path(path, &segment), on_node);
    }
}

/// Indented outline of the tree, one node per line, leaf values quoted.
/// The shape the `check` subcommand prints and the test-suite snapshots.
pub fn render_outline(tree: &SyntaxTree, root: NodeId) -> String {
    let mut out = String::new();
    walk(tree, root, &mut |path, id| {
        let node = tree.node(id);
        let depth = path.matches('/').count();
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("{:?}", node.kind));
        if let Some(value) = &node.value {
            out.push_str(&format!(" {:?}", value));
        }
        out.push('\n');
    });
    out
}
