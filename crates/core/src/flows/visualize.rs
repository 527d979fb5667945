//! Graphviz rendering of the routing graph.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::flows::states::{FlowEdge, Step};

const HIGHLIGHT_COLOR: &str = "red";
const HIGHLIGHT_PENWIDTH: u8 = 3;

/// Renders every declared edge, drawing consecutive pairs of `path` in red.
///
/// Path pairs that are not declared edges are still drawn so a malformed
/// trace stays visible. Output depends only on the inputs.
pub fn render_dot(edges: &[FlowEdge], path: Option<&[Step]>) -> String {
    let taken: BTreeSet<(Step, Step)> = path
        .map(|steps| steps.windows(2).map(|pair| (pair[0], pair[1])).collect())
        .unwrap_or_default();
    let visited: BTreeSet<Step> = path.map(|steps| steps.iter().copied().collect()).unwrap_or_default();

    let mut dot = String::from("digraph TariffTok {\n");
    dot.push_str("    rankdir=TB;\n");
    dot.push_str("    node [shape=box, style=\"rounded,filled\", fillcolor=\"#f5f5f5\", fontname=\"Helvetica\"];\n");
    dot.push_str("    edge [fontname=\"Helvetica\", fontsize=10];\n\n");

    for step in Step::ALL {
        let shape = if matches!(step, Step::Start | Step::End) { "ellipse" } else { "box" };
        let fill = if visited.contains(&step) { "#ffe0e0" } else { "#f5f5f5" };
        let _ = writeln!(dot, "    {step} [label=\"{step}\", shape={shape}, fillcolor=\"{fill}\"];");
    }
    dot.push('\n');

    let mut drawn = BTreeSet::new();
    for edge in edges {
        drawn.insert((edge.from, edge.to));
        let _ = write!(dot, "    {} -> {} [label=\"{}\"", edge.from, edge.to, edge.condition);
        if taken.contains(&(edge.from, edge.to)) {
            let _ = write!(dot, ", color={HIGHLIGHT_COLOR}, penwidth={HIGHLIGHT_PENWIDTH}");
        }
        dot.push_str("];\n");
    }

    for (from, to) in taken.difference(&drawn) {
        let _ = writeln!(
            dot,
            "    {from} -> {to} [style=dashed, color={HIGHLIGHT_COLOR}, penwidth={HIGHLIGHT_PENWIDTH}];"
        );
    }

    dot.push_str("}\n");
    dot
}
