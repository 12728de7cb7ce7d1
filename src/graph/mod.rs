//! # Semantic Graph
//!
//! Immutable, indexed projection of a building model. Built once per run by
//! [`GraphBuilder`] and only read afterwards, so it is `Send + Sync` without
//! any locking.
//!
//! ## Indices
//!
//! | Index | Key | Order |
//! |-------|-----|-------|
//! | node table | `NodeId` | enumeration order |
//! | guid index | external key | - |
//! | adjacency | (node, direction, kind) | edge creation order |
//! | type index | type tag | tag order, then node id |
//! | kind index | `EdgeKind` | kind order, then edge id |

pub mod builder;
pub mod connects;
pub mod diagnostics;

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{Direction, Edge, EdgeId, EdgeKind, Node, NodeId};

pub use builder::{GraphBuild, GraphBuilder};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity, Stage};

type KindSlots = [SmallVec<[EdgeId; 4]>; 4];

/// Node and edge counts reported after a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Edge kind name → count, for every kind.
    pub edges_by_kind: BTreeMap<String, usize>,
    /// Type tag → count.
    pub nodes_by_type: BTreeMap<String, usize>,
    pub heuristic_edges: usize,
}

/// The read-only semantic graph.
#[derive(Debug, Clone)]
pub struct SemanticGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_guid: HashMap<Arc<str>, NodeId>,
    outgoing: Vec<KindSlots>,
    incoming: Vec<KindSlots>,
    type_index: BTreeMap<String, Vec<NodeId>>,
    kind_index: [Vec<EdgeId>; 4],
}

impl SemanticGraph {
    /// Index nodes and edges. Node ids must be dense (`nodes[i].id == i`),
    /// edge ids likewise, and every endpoint must exist; the builder
    /// guarantees all three.
    pub(crate) fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        debug_assert!(nodes.iter().enumerate().all(|(i, n)| n.id.index() == i));
        debug_assert!(edges.iter().enumerate().all(|(i, e)| e.id.0 as usize == i));

        let mut by_guid = HashMap::with_capacity(nodes.len());
        let mut type_index: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        for node in &nodes {
            by_guid.insert(Arc::clone(&node.guid), node.id);
            type_index.entry(node.type_tag.clone()).or_default().push(node.id);
        }

        let mut outgoing: Vec<KindSlots> = vec![KindSlots::default(); nodes.len()];
        let mut incoming: Vec<KindSlots> = vec![KindSlots::default(); nodes.len()];
        let mut kind_index: [Vec<EdgeId>; 4] = Default::default();
        for edge in &edges {
            let k = edge.kind.index();
            outgoing[edge.source.index()][k].push(edge.id);
            incoming[edge.target.index()][k].push(edge.id);
            kind_index[k].push(edge.id);
        }

        Self { nodes, edges, by_guid, outgoing, incoming, type_index, kind_index }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_by_guid(&self, guid: &str) -> Option<&Node> {
        self.by_guid.get(guid).and_then(|&id| self.node(id))
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in type-index order: type tag, then node id.
    pub fn nodes_in_type_order(&self) -> impl Iterator<Item = &Node> + '_ {
        self.type_index
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|&id| self.node(id))
    }

    /// Ids of the nodes with the given type tag, in id order.
    pub fn nodes_of_type(&self, type_tag: &str) -> &[NodeId] {
        self.type_index.get(type_tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.type_index.keys().map(String::as_str)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0 as usize)
    }

    /// All edges in creation order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in kind-index order: kind, then edge id.
    pub fn edges_in_kind_order(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.kind_index
            .iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|&id| self.edge(id))
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> &[EdgeId] {
        &self.kind_index[kind.index()]
    }

    /// `(source, target, edge)` triples for graph export, in kind-index order.
    /// An empty `kinds` slice means every kind.
    pub fn edge_list(&self, kinds: &[EdgeKind], min_confidence: f64) -> Vec<&Edge> {
        self.edges_in_kind_order()
            .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
            .filter(|e| e.confidence >= min_confidence)
            .collect()
    }

    // ========================================================================
    // Adjacency
    // ========================================================================

    fn slots(&self, node: NodeId, outgoing: bool) -> Option<&KindSlots> {
        let table = if outgoing { &self.outgoing } else { &self.incoming };
        table.get(node.index())
    }

    fn collect_side(&self, node: NodeId, outgoing: bool, kind: Option<EdgeKind>, out: &mut Vec<EdgeId>) {
        if let Some(slots) = self.slots(node, outgoing) {
            match kind {
                Some(k) => out.extend_from_slice(&slots[k.index()]),
                None => slots.iter().for_each(|s| out.extend_from_slice(s)),
            }
        }
    }

    /// Edges touching `node` in the given direction. `kind = None` means any
    /// kind (kind order). `Both` lists outgoing edges before incoming ones.
    pub fn adjacent(&self, node: NodeId, direction: Direction, kind: Option<EdgeKind>) -> Vec<EdgeId> {
        let mut out = Vec::new();
        match direction {
            Direction::Outgoing => self.collect_side(node, true, kind, &mut out),
            Direction::Incoming => self.collect_side(node, false, kind, &mut out),
            Direction::Both => {
                self.collect_side(node, true, kind, &mut out);
                self.collect_side(node, false, kind, &mut out);
            }
        }
        out
    }

    /// Number of matching edges; 0 for a node without any.
    pub fn degree(&self, node: NodeId, direction: Direction, kind: Option<EdgeKind>) -> usize {
        let count = |outgoing: bool| {
            self.slots(node, outgoing).map_or(0, |slots| match kind {
                Some(k) => slots[k.index()].len(),
                None => slots.iter().map(SmallVec::len).sum(),
            })
        };
        match direction {
            Direction::Outgoing => count(true),
            Direction::Incoming => count(false),
            Direction::Both => count(true) + count(false),
        }
    }

    /// Nodes at the other end of matching edges, first occurrence kept.
    pub fn neighbors(&self, node: NodeId, direction: Direction, kind: Option<EdgeKind>) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.adjacent(node, direction, kind)
            .into_iter()
            .filter_map(|id| self.edge(id))
            .filter_map(|e| e.other_node(node))
            .filter(|n| seen.insert(*n))
            .collect()
    }

    fn first_outgoing(&self, node: NodeId, kind: EdgeKind) -> Option<NodeId> {
        self.slots(node, true)?[kind.index()]
            .first()
            .and_then(|&id| self.edge(id))
            .map(|e| e.target)
    }

    // ========================================================================
    // Relationship shortcuts used by the built-ins
    // ========================================================================

    /// Immediate spatial container: first outgoing `contained_in` edge.
    pub fn contained_in(&self, node: NodeId) -> Option<NodeId> {
        self.first_outgoing(node, EdgeKind::ContainedIn)
    }

    /// Containers from the immediate one outwards. Each step follows
    /// `contained_in`, falling back to the decomposition parent so that
    /// storey → building → site chains modelled as aggregation are walked too.
    /// Stops at the first repeated node.
    pub fn container_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::from_iter([node]);
        let mut current = node;
        while let Some(parent) = self.contained_in(current).or_else(|| self.decomposes(current)) {
            if !visited.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub fn type_of(&self, node: NodeId) -> Option<NodeId> {
        self.first_outgoing(node, EdgeKind::TypeOf)
    }

    /// Parent in the decomposition: source of the first incoming `aggregates` edge.
    pub fn decomposes(&self, node: NodeId) -> Option<NodeId> {
        self.slots(node, false)?[EdgeKind::Aggregates.index()]
            .first()
            .and_then(|&id| self.edge(id))
            .map(|e| e.source)
    }

    /// Parts aggregated by this node.
    pub fn aggregates(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Outgoing, Some(EdgeKind::Aggregates))
    }

    /// Connected elements in either direction, deduplicated.
    pub fn connects_to(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Both, Some(EdgeKind::ConnectsTo))
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            edges_by_kind: EdgeKind::ALL
                .iter()
                .map(|k| (k.as_str().to_string(), self.kind_index[k.index()].len()))
                .collect(),
            nodes_by_type: self
                .type_index
                .iter()
                .map(|(tag, ids)| (tag.clone(), ids.len()))
                .collect(),
            heuristic_edges: self.edges.iter().filter(|e| e.provenance.is_heuristic()).count(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
