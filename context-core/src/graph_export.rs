//! Dependency graph export: DOT, JSON, and Mermaid renderers (spec §4.7).

use crate::dependency_graph::DependencyGraph;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Export filters shared by all three renderers.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub file_pattern: Option<String>,
    pub max_depth: Option<usize>,
}

impl ExportFilter {
    fn matches(&self, file: &str) -> bool {
        self.file_pattern
            .as_ref()
            .is_none_or(|pattern| file.contains(pattern.as_str()))
    }
}

#[derive(Debug, Serialize)]
pub struct JsonNode {
    pub id: String,
    pub in_cycle: bool,
}

#[derive(Debug, Serialize)]
pub struct JsonLink {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct JsonGraph {
    pub nodes: Vec<JsonNode>,
    pub links: Vec<JsonLink>,
    pub circular_groups: Vec<Vec<String>>,
}

fn filtered_nodes(graph: &DependencyGraph, filter: &ExportFilter) -> Vec<String> {
    let mut nodes: Vec<String> = graph
        .all_files()
        .into_iter()
        .filter(|f| filter.matches(f))
        .collect();
    nodes.sort();
    nodes
}

fn filtered_edges(graph: &DependencyGraph, nodes: &HashSet<String>) -> Vec<(String, String)> {
    let mut edges = Vec::new();
    for source in nodes {
        for target in graph.get_dependencies(source) {
            if nodes.contains(&target) {
                edges.push((source.clone(), target));
            }
        }
    }
    edges.sort();
    edges
}

/// Render the graph (after `filter`) as Graphviz DOT. Nodes participating in
/// a cycle are filled `#ff9999`; edges that close a cycle are drawn thick red.
#[must_use]
pub fn export_dot(graph: &DependencyGraph, filter: &ExportFilter) -> String {
    let nodes = filtered_nodes(graph, filter);
    let node_set: HashSet<String> = nodes.iter().cloned().collect();
    let edges = filtered_edges(graph, &node_set);
    let cycles = graph.detect_circular_dependencies();
    let in_cycle: HashSet<&String> = cycles.iter().flatten().collect();
    let cycle_edges: HashSet<(String, String)> = cycles
        .iter()
        .flat_map(|cycle| {
            let mut pairs = Vec::new();
            for w in cycle.windows(2) {
                pairs.push((w[0].clone(), w[1].clone()));
            }
            if cycle.len() > 1 {
                pairs.push((cycle[cycle.len() - 1].clone(), cycle[0].clone()));
            }
            pairs
        })
        .collect();

    let mut out = String::from("digraph {\n    rankdir=LR;\n");
    for node in &nodes {
        if in_cycle.contains(node) {
            let _ = writeln!(out, "    \"{node}\" [style=filled, fillcolor=\"#ff9999\"];");
        } else {
            let _ = writeln!(out, "    \"{node}\";");
        }
    }
    for (source, target) in &edges {
        if cycle_edges.contains(&(source.clone(), target.clone())) {
            let _ = writeln!(out, "    \"{source}\" -> \"{target}\" [color=red, penwidth=2];");
        } else {
            let _ = writeln!(out, "    \"{source}\" -> \"{target}\";");
        }
    }
    out.push_str("}\n");
    out
}

/// Render the graph (after `filter`) as a JSON node/link/circular_groups
/// document, suitable for force-directed visualizers.
#[must_use]
pub fn export_json(graph: &DependencyGraph, filter: &ExportFilter) -> JsonGraph {
    let nodes = filtered_nodes(graph, filter);
    let node_set: HashSet<String> = nodes.iter().cloned().collect();
    let edges = filtered_edges(graph, &node_set);
    let cycles = graph.detect_circular_dependencies();
    let in_cycle: HashSet<&String> = cycles.iter().flatten().collect();

    JsonGraph {
        nodes: nodes
            .iter()
            .map(|id| JsonNode {
                id: id.clone(),
                in_cycle: in_cycle.contains(id),
            })
            .collect(),
        links: edges
            .into_iter()
            .map(|(source, target)| JsonLink { source, target })
            .collect(),
        circular_groups: cycles,
    }
}

/// Render the graph (after `filter`) as a Mermaid `graph LR` block. Cycle
/// edges are drawn dashed (`-.->`) to stand out against normal solid arrows.
#[must_use]
pub fn export_mermaid(graph: &DependencyGraph, filter: &ExportFilter) -> String {
    let nodes = filtered_nodes(graph, filter);
    let node_set: HashSet<String> = nodes.iter().cloned().collect();
    let edges = filtered_edges(graph, &node_set);
    let cycles = graph.detect_circular_dependencies();
    let cycle_edges: HashSet<(String, String)> = cycles
        .iter()
        .flat_map(|cycle| {
            let mut pairs = Vec::new();
            for w in cycle.windows(2) {
                pairs.push((w[0].clone(), w[1].clone()));
            }
            if cycle.len() > 1 {
                pairs.push((cycle[cycle.len() - 1].clone(), cycle[0].clone()));
            }
            pairs
        })
        .collect();

    let mut out = String::from("graph LR\n");
    for (source, target) in &edges {
        let id_s = mermaid_id(source);
        let id_t = mermaid_id(target);
        if cycle_edges.contains(&(source.clone(), target.clone())) {
            let _ = writeln!(out, "    {id_s}[\"{source}\"] -.-> {id_t}[\"{target}\"]");
        } else {
            let _ = writeln!(out, "    {id_s}[\"{source}\"] --> {id_t}[\"{target}\"]");
        }
    }
    out
}

/// Mermaid node ids must be alphanumeric-ish; hash the file path down to a
/// stable short token.
fn mermaid_id(file: &str) -> String {
    file.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency_graph::ImportDetail;

    fn detail() -> ImportDetail {
        ImportDetail {
            module: "m".to_string(),
            items: vec![],
            line: 1,
        }
    }

    fn cyclic_graph() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_edge("a.py", "b.py", detail());
        g.add_edge("b.py", "a.py", detail());
        g
    }

    #[test]
    fn dot_marks_cycle_nodes_and_edges() {
        let g = cyclic_graph();
        let dot = export_dot(&g, &ExportFilter::default());
        assert!(dot.contains("#ff9999"));
        assert!(dot.contains("color=red"));
    }

    #[test]
    fn json_reports_circular_groups() {
        let g = cyclic_graph();
        let json = export_json(&g, &ExportFilter::default());
        assert_eq!(json.circular_groups.len(), 1);
        assert!(json.nodes.iter().all(|n| n.in_cycle));
    }

    #[test]
    fn mermaid_uses_dashed_arrows_for_cycle_edges() {
        let g = cyclic_graph();
        let mermaid = export_mermaid(&g, &ExportFilter::default());
        assert!(mermaid.contains("-.->"));
    }

    #[test]
    fn file_pattern_filter_excludes_non_matching_nodes() {
        let mut g = DependencyGraph::new();
        g.add_edge("src/a.py", "tests/b.py", detail());
        let filter = ExportFilter {
            file_pattern: Some("src/".to_string()),
            max_depth: None,
        };
        let json = export_json(&g, &filter);
        assert_eq!(json.nodes.len(), 1);
        assert!(json.links.is_empty());
    }
}
