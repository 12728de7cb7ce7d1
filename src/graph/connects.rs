//! `connects_to` inference.
//!
//! Kept apart from the structural build because it is best-effort: explicit
//! connection relations are often incomplete in real models, and the optional
//! adjacency rule guesses from bounding boxes. The step never fails by itself;
//! it returns partial edges plus its own diagnostics and the builder applies
//! the configured policy.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use tracing::debug;

use crate::config::AdjacencyConfig;
use crate::model::{Node, NodeId, Provenance};
use super::diagnostics::{Diagnostic, DiagnosticCode, Stage};

/// Name of the bounding-box adjacency rule, recorded in edge provenance.
pub const ADJACENCY_RULE: &str = "bbox_adjacency";

/// An explicit connection relation, target not yet resolved.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub source: NodeId,
    pub source_key: String,
    pub relation: String,
    pub target_key: String,
}

/// A `connects_to` edge without an id.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub provenance: Provenance,
    pub confidence: f64,
}

#[derive(Debug, Default)]
pub struct ConnectsOutcome {
    pub edges: Vec<PartialEdge>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve explicit requests, then run the adjacency rule if enabled.
///
/// `containers` maps each contained node to its spatial container.
pub fn infer(
    nodes: &[Node],
    resolve: impl Fn(&str) -> Option<NodeId>,
    requests: &[ConnectionRequest],
    containers: &BTreeMap<NodeId, NodeId>,
    adjacency: &AdjacencyConfig,
) -> ConnectsOutcome {
    let mut out = ConnectsOutcome::default();
    let mut linked: HashSet<(NodeId, NodeId)> = HashSet::new();

    for req in requests {
        let Some(target) = resolve(&req.target_key) else {
            out.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::MissingTarget,
                    req.source_key.as_str(),
                    format!("{} target '{}' not present in model", req.relation, req.target_key),
                )
                .at(Stage::ConnectsTo),
            );
            continue;
        };
        if target == req.source {
            out.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::SelfLoop,
                    req.source_key.as_str(),
                    format!("{} connects the element to itself", req.relation),
                )
                .at(Stage::ConnectsTo),
            );
            continue;
        }
        if !linked.insert((req.source, target)) {
            continue;
        }
        out.edges.push(PartialEdge {
            source: req.source,
            target,
            provenance: Provenance::Explicit { relation: req.relation.clone() },
            confidence: 1.0,
        });
    }

    if adjacency.enabled {
        let before = out.edges.len();
        infer_adjacency(nodes, containers, adjacency, &mut linked, &mut out.edges);
        debug!(inferred = out.edges.len() - before, "adjacency rule applied");
    }
    out
}

/// Pairs of nodes sharing a container whose boxes touch. Pairs are visited in
/// (container, lower id, higher id) order; already linked pairs are skipped in
/// either direction.
fn infer_adjacency(
    nodes: &[Node],
    containers: &BTreeMap<NodeId, NodeId>,
    config: &AdjacencyConfig,
    linked: &mut HashSet<(NodeId, NodeId)>,
    edges: &mut Vec<PartialEdge>,
) {
    let mut groups: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (&member, &container) in containers {
        groups.entry(container).or_default().push(member);
    }

    let bbox = |id: NodeId| {
        nodes
            .get(id.index())
            .and_then(|n| n.geometry.as_ref())
            .and_then(|g| g.bbox)
    };

    for members in groups.values() {
        for (i, &a) in members.iter().enumerate() {
            let Some(box_a) = bbox(a) else { continue };
            for &b in &members[i + 1..] {
                let Some(box_b) = bbox(b) else { continue };
                if linked.contains(&(a, b)) || linked.contains(&(b, a)) {
                    continue;
                }
                if box_a.touches(&box_b, config.tolerance) {
                    linked.insert((a, b));
                    edges.push(PartialEdge {
                        source: a,
                        target: b,
                        provenance: Provenance::Heuristic { rule: ADJACENCY_RULE.to_string() },
                        confidence: config.confidence,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, GeometryHandle};

    fn boxed(id: u32, key: &str, min_x: f64) -> Node {
        let mut n = Node::new(NodeId(id), key, "IfcWall");
        n.geometry = Some(
            GeometryHandle::new(format!("g{id}"))
                .with_bbox(BoundingBox::new([min_x, 0.0, 0.0], [min_x + 1.0, 1.0, 1.0])),
        );
        n
    }

    fn resolver(nodes: &[Node]) -> impl Fn(&str) -> Option<NodeId> + '_ {
        move |key| nodes.iter().find(|n| &*n.guid == key).map(|n| n.id)
    }

    #[test]
    fn test_explicit_requests() {
        let nodes = vec![boxed(0, "a", 0.0), boxed(1, "b", 5.0)];
        let requests = vec![
            ConnectionRequest { source: NodeId(0), source_key: "a".into(), relation: "IfcRelConnectsElements".into(), target_key: "b".into() },
            ConnectionRequest { source: NodeId(0), source_key: "a".into(), relation: "IfcRelConnectsElements".into(), target_key: "b".into() },
            ConnectionRequest { source: NodeId(0), source_key: "a".into(), relation: "connects_to".into(), target_key: "zzz".into() },
            ConnectionRequest { source: NodeId(1), source_key: "b".into(), relation: "connects_to".into(), target_key: "b".into() },
        ];
        let out = infer(&nodes, resolver(&nodes), &requests, &BTreeMap::new(), &AdjacencyConfig::default());
        assert_eq!(out.edges.len(), 1);
        assert_eq!(out.edges[0].provenance, Provenance::Explicit { relation: "IfcRelConnectsElements".into() });
        let codes: Vec<_> = out.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::MissingTarget, DiagnosticCode::SelfLoop]);
        assert!(out.diagnostics.iter().all(|d| d.stage == Stage::ConnectsTo));
    }

    #[test]
    fn test_adjacency_needs_shared_container() {
        let nodes = vec![boxed(0, "a", 0.0), boxed(1, "b", 1.0), boxed(2, "c", 2.0), Node::new(NodeId(3), "st", "IfcBuildingStorey"), Node::new(NodeId(4), "st2", "IfcBuildingStorey")];
        let containers = BTreeMap::from([(NodeId(0), NodeId(3)), (NodeId(1), NodeId(3)), (NodeId(2), NodeId(4))]);
        let adjacency = AdjacencyConfig { enabled: true, tolerance: 0.01, confidence: 0.4 };
        let out = infer(&nodes, resolver(&nodes), &[], &containers, &adjacency);
        assert_eq!(out.edges.len(), 1);
        let e = &out.edges[0];
        assert_eq!((e.source, e.target), (NodeId(0), NodeId(1)));
        assert!(e.provenance.is_heuristic());
        assert_eq!(e.confidence, 0.4);
    }

    #[test]
    fn test_adjacency_skips_explicitly_linked_pairs() {
        let nodes = vec![boxed(0, "a", 0.0), boxed(1, "b", 1.0), Node::new(NodeId(2), "st", "IfcBuildingStorey")];
        let containers = BTreeMap::from([(NodeId(0), NodeId(2)), (NodeId(1), NodeId(2))]);
        let requests = vec![ConnectionRequest { source: NodeId(1), source_key: "b".into(), relation: "connects_to".into(), target_key: "a".into() }];
        let adjacency = AdjacencyConfig { enabled: true, ..AdjacencyConfig::default() };
        let out = infer(&nodes, resolver(&nodes), &requests, &containers, &adjacency);
        assert_eq!(out.edges.len(), 1);
        assert!(!out.edges[0].provenance.is_heuristic());
    }
}
