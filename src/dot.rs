//! Constraint tree to DOT (Graphviz) conversion.
//!
//! # DOT Format
//!
//! - The **root** is a rectangle at the top (source rank)
//! - **Reached nodes** are ellipses labeled with their id, predicate and the
//!   inputs of the run that reached them
//! - **Archived nodes** (given up after the timeout ladder) are drawn with
//!   the archived style and their give-up reason
//! - **Edges**: solid lines lead to `true` outcomes, dashed lines to `false`
//!
//! # Examples
//!
//! ```
//! use concolic_rs::tree::ConstraintTree;
//!
//! let tree = ConstraintTree::new();
//! let dot = tree.to_dot();
//! assert!(dot.starts_with("digraph"));
//! // Render with: dot -Tpng tree.dot -o tree.png
//! ```

use std::fmt::Write;

use crate::tree::ConstraintTree;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for the root node (default: "rect")
    pub root_shape: &'static str,
    /// Shape for branch nodes (default: "ellipse")
    pub node_shape: &'static str,
    /// Style for archived nodes (default: "dashed")
    pub archived_style: &'static str,
    /// Style for edges to `true` outcomes (default: "solid")
    pub true_edge_style: &'static str,
    /// Style for edges to `false` outcomes (default: "dashed")
    pub false_edge_style: &'static str,
    /// Whether to print the inputs of reached nodes (default: true)
    pub show_inputs: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            root_shape: "rect",
            node_shape: "ellipse",
            archived_style: "dashed",
            true_edge_style: "solid",
            false_edge_style: "dashed",
            show_inputs: true,
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ConstraintTree {
    /// Converts the tree to DOT format with the default [`DotConfig`].
    pub fn to_dot(&self) -> String {
        self.to_dot_with_config(&DotConfig::default())
    }

    pub fn to_dot_with_config(&self, config: &DotConfig) -> String {
        let mut dot = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_dot(&mut dot, config);
        dot
    }

    fn write_dot(&self, dot: &mut String, config: &DotConfig) -> std::fmt::Result {
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;
        writeln!(dot, "{{ rank=source; n0 [label=\"root\", shape={}]; }}", config.root_shape)?;

        for node in self.iter().skip(1) {
            let id = node.id();
            let mut label = format!("{}", id);
            if let Some(p) = node.predicate() {
                label.push_str(&format!("\\n{}", escape(&p.to_string())));
            }
            if let Some(l) = node.branch_label() {
                label.push_str(&format!("\\n@{}", escape(l)));
            }
            match (node.archived(), node.inputs()) {
                (Some(reason), _) => {
                    label.push_str(&format!("\\n[{}]", reason));
                    writeln!(dot, "n{} [label=\"{}\", style={}];", id.id(), label, config.archived_style)?;
                }
                (None, Some(inputs)) if config.show_inputs => {
                    label.push_str(&format!("\\n{}", escape(&inputs.to_string())));
                    writeln!(dot, "n{} [label=\"{}\"];", id.id(), label)?;
                }
                _ => {
                    writeln!(dot, "n{} [label=\"{}\"];", id.id(), label)?;
                }
            }
        }

        for node in self.iter() {
            for outcome in [true, false] {
                if let Some(child) = node.child(outcome) {
                    let style = if outcome {
                        config.true_edge_style
                    } else {
                        config.false_edge_style
                    };
                    writeln!(dot, "n{} -> n{} [style={}];", node.id().id(), child.id(), style)?;
                }
            }
        }

        writeln!(dot, "}}")
    }
}
