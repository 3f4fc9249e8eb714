use crate::SeriesRef;
use absdisc_core::AbstractBlock;
use serde::Serialize;
use std::fmt::Write;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Interesting,
    NotInteresting,
    End,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesRef>,
    /// Block state shown by the node; end markers carry none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<AbstractBlock>,
}

/// Nodes laid out in rows, one row per refinement level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WitnessGraph {
    nodes: Vec<Node>,
    edges: Vec<(NodeId, NodeId)>,
    rows: Vec<Vec<NodeId>>,
    #[serde(skip)]
    current: Vec<NodeId>,
    #[serde(skip)]
    boundaries: usize,
}

impl WitnessGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the row under construction.
    pub fn add_node(&mut self, kind: NodeKind, label: String, series: Option<SeriesRef>, block: Option<AbstractBlock>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { id, kind, label, series, block });
        self.current.push(id);
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.push((from, to));
    }

    pub fn new_row(&mut self) {
        self.rows.push(std::mem::take(&mut self.current));
        self.boundaries += 1;
    }

    /// Closes the trailing row, dropping it when nothing was added after the last boundary.
    pub fn finish(mut self) -> Self {
        if !self.current.is_empty() {
            self.rows.push(std::mem::take(&mut self.current));
        }
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    pub fn rows(&self) -> &[Vec<NodeId>] {
        &self.rows
    }

    /// Number of explicit row breaks taken so far.
    pub fn row_boundaries(&self) -> usize {
        self.boundaries
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.edges.iter().find(|(_, to)| *to == id).map(|(from, _)| *from)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain text rendering, one block per node grouped by row.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (r, row) in self.rows.iter().enumerate() {
            let _ = writeln!(out, "== row {r} ==");
            for node in row.iter().filter_map(|id| self.nodes.get(*id)) {
                let parent = self.parent_of(node.id).map(|p| format!(" <- #{p}")).unwrap_or_default();
                let series = node.series.as_ref().map(|s| format!(" [series {s}]")).unwrap_or_default();
                let _ = writeln!(out, "#{} {:?}{parent}{series}", node.id, node.kind);
                for line in node.label.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trailing_row_is_dropped() {
        let mut g = WitnessGraph::new();
        let s = g.add_node(NodeKind::Start, "start".into(), None, None);
        g.new_row();
        let n = g.add_node(NodeKind::Interesting, "n".into(), None, None);
        g.add_edge(s, n);
        g.new_row();
        let g = g.finish();
        assert_eq!(g.rows(), &[vec![0], vec![1]]);
        assert_eq!(g.row_boundaries(), 2);
        assert_eq!(g.parent_of(n), Some(s));
        assert!(g.to_text().contains("#1 Interesting <- #0"));
    }

    #[test]
    fn json_output_lists_rows_and_edges() {
        let mut g = WitnessGraph::new();
        g.add_node(NodeKind::Start, "s".into(), None, None);
        g.new_row();
        let end = g.add_node(NodeKind::End, "Terminated: done".into(), Some(SeriesRef::Id(2)), None);
        g.add_edge(0, end);
        let v: serde_json::Value = serde_json::from_str(&g.finish().to_json().unwrap()).unwrap();
        assert_eq!(v["rows"], serde_json::json!([[0], [1]]));
        assert_eq!(v["edges"], serde_json::json!([[0, 1]]));
        assert_eq!(v["nodes"][1]["kind"], "end");
        assert_eq!(v["nodes"][1]["series"], 2);
        assert!(v["nodes"][0].get("series").is_none());
    }
}
