//! Edge in the semantic graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use super::NodeId;

/// Edge identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of edge kinds. Declaration order is the kind-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// element → spatial container
    ContainedIn,
    /// whole → part
    Aggregates,
    /// instance → type definition
    TypeOf,
    /// element → element (best-effort)
    ConnectsTo,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 4] = [
        EdgeKind::ContainedIn,
        EdgeKind::Aggregates,
        EdgeKind::TypeOf,
        EdgeKind::ConnectsTo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::ContainedIn => "contained_in",
            EdgeKind::Aggregates => "aggregates",
            EdgeKind::TypeOf => "type_of",
            EdgeKind::ConnectsTo => "connects_to",
        }
    }

    /// Slot in per-kind adjacency arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown edge kind '{s}'"))
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out" | "outgoing" => Ok(Direction::Outgoing),
            "in" | "incoming" => Ok(Direction::Incoming),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction '{other}' (expected in, out or both)")),
        }
    }
}

/// Where an edge came from. Consumers filter heuristic edges by this tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// Spatial decomposition, aggregation or typing relations.
    Structural,
    /// An explicit connection relation of the model.
    Explicit { relation: String },
    /// Inferred by an adjacency rule.
    Heuristic { rule: String },
}

impl Provenance {
    pub fn label(&self) -> String {
        match self {
            Provenance::Structural => "structural".to_string(),
            Provenance::Explicit { relation } => format!("explicit:{relation}"),
            Provenance::Heuristic { rule } => format!("heuristic:{rule}"),
        }
    }

    pub fn is_heuristic(&self) -> bool {
        matches!(self, Provenance::Heuristic { .. })
    }
}

/// A directed edge in the semantic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    pub provenance: Provenance,
    /// 1.0 for structural and explicit edges.
    pub confidence: f64,
}

impl Edge {
    pub fn new(id: EdgeId, kind: EdgeKind, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            kind,
            source,
            target,
            provenance: Provenance::Structural,
            confidence: 1.0,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance, confidence: f64) -> Self {
        self.provenance = provenance;
        self.confidence = confidence;
        self
    }

    /// The "other" end of the edge from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.source { Some(self.target) }
        else if from == self.target { Some(self.source) }
        else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_round_trips_through_str() {
        for kind in EdgeKind::ALL {
            assert_eq!(kind.as_str().parse::<EdgeKind>().unwrap(), kind);
        }
        assert!("contains".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn test_direction_aliases() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("outgoing".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_other_node() {
        let e = Edge::new(EdgeId(0), EdgeKind::ConnectsTo, NodeId(1), NodeId(2));
        assert_eq!(e.other_node(NodeId(1)), Some(NodeId(2)));
        assert_eq!(e.other_node(NodeId(2)), Some(NodeId(1)));
        assert_eq!(e.other_node(NodeId(3)), None);
    }
}
