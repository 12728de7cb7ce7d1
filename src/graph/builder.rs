//! Graph Builder: model source → [`SemanticGraph`].
//!
//! One deterministic pass over the entities creates the nodes, a second pass
//! resolves relationships into edges, then `connects_to` inference runs and
//! the indices are built. Nothing here is order-dependent beyond the source's
//! own enumeration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use tracing::{info, warn};

use crate::config::{ConnectsToPolicy, RunConfig};
use crate::model::{Edge, EdgeId, EdgeKind, Node, NodeId, Provenance};
use crate::source::{ModelSource, RawRelationship};
use crate::{Error, Result};
use super::connects::{self, ConnectionRequest};
use super::diagnostics::{Diagnostic, DiagnosticCode};
use super::SemanticGraph;

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: SemanticGraph,
    /// Non-fatal findings in the order they were made.
    pub diagnostics: Vec<Diagnostic>,
}

/// How a relation name maps onto the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationMapping {
    pub kind: EdgeKind,
    /// Edge runs target → entity instead of entity → target.
    pub reversed: bool,
}

/// Map a loader relation name to an edge kind. Short names and IFC relation
/// entity names are both accepted.
pub fn classify_relation(name: &str) -> Option<RelationMapping> {
    let (kind, reversed) = match name.trim() {
        "contained_in" | "IfcRelContainedInSpatialStructure" => (EdgeKind::ContainedIn, false),
        "contains" => (EdgeKind::ContainedIn, true),
        "aggregates" | "IfcRelAggregates" | "IfcRelNests" => (EdgeKind::Aggregates, false),
        "decomposes" => (EdgeKind::Aggregates, true),
        "type_of" | "IfcRelDefinesByType" => (EdgeKind::TypeOf, false),
        "connects_to"
        | "IfcRelConnectsElements"
        | "IfcRelConnectsPorts"
        | "IfcRelConnectsPortToElement"
        | "IfcRelConnectsPathElements" => (EdgeKind::ConnectsTo, false),
        _ => return None,
    };
    Some(RelationMapping { kind, reversed })
}

/// Trim and strip a schema qualifier: `IFC4.IfcWall` and `ifc2x3::IfcWall`
/// both become `IfcWall`.
pub fn normalize_type_tag(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit(['.', ':']).next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => trimmed.to_string(),
    }
}

pub struct GraphBuilder {
    config: RunConfig,
}

/// Mutable state of one build.
struct BuildState<'c> {
    config: &'c RunConfig,
    nodes: Vec<Node>,
    by_key: HashMap<Arc<str>, NodeId>,
    edges: Vec<Edge>,
    seen_edges: HashSet<(EdgeKind, NodeId, NodeId)>,
    diagnostics: Vec<Diagnostic>,
}

impl BuildState<'_> {
    /// Record a diagnostic; under strict mode a structural error ends the build.
    fn report(&mut self, diagnostic: Diagnostic) -> Result<()> {
        if self.config.strict && diagnostic.is_strict_fatal() {
            return Err(self.fail(diagnostic));
        }
        warn!(code = diagnostic.code.as_str(), entity = %diagnostic.entity, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
        Ok(())
    }

    fn fail(&mut self, diagnostic: Diagnostic) -> Error {
        self.diagnostics.push(diagnostic.clone());
        Error::GraphBuild {
            diagnostic: Box::new(diagnostic),
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    /// A repeated `(kind, source, target)` keeps the first edge.
    fn add_edge(&mut self, kind: EdgeKind, source: NodeId, target: NodeId, provenance: Provenance, confidence: f64) {
        if self.seen_edges.insert((kind, source, target)) {
            let id = EdgeId(self.edges.len() as u64);
            self.edges.push(Edge::new(id, kind, source, target).with_provenance(provenance, confidence));
        }
    }
}

impl GraphBuilder {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[tracing::instrument(skip_all, fields(strict = self.config.strict))]
    pub fn build(&self, source: &dyn ModelSource) -> Result<GraphBuild> {
        let mut state = BuildState {
            config: &self.config,
            nodes: Vec::new(),
            by_key: HashMap::new(),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
            diagnostics: Vec::new(),
        };

        let pending = self.load_nodes(source, &mut state)?;
        let requests = self.resolve_relationships(&pending, &mut state)?;
        self.infer_connections(&requests, &mut state)?;

        let BuildState { nodes, edges, diagnostics, .. } = state;
        let graph = SemanticGraph::from_parts(nodes, edges);
        let stats = graph.stats();
        info!(
            nodes = stats.nodes,
            edges = stats.edges,
            heuristic = stats.heuristic_edges,
            diagnostics = diagnostics.len(),
            "semantic graph built"
        );
        Ok(GraphBuild { graph, diagnostics })
    }

    // ========================================================================
    // Pass 1: nodes
    // ========================================================================

    fn load_nodes(
        &self,
        source: &dyn ModelSource,
        state: &mut BuildState<'_>,
    ) -> Result<Vec<(NodeId, Vec<RawRelationship>)>> {
        let mut pending = Vec::new();
        for entity in source.enumerate_entities()? {
            if entity.key.trim().is_empty() {
                state.report(Diagnostic::error(
                    DiagnosticCode::EmptyKey,
                    "",
                    format!("{} entity without a key skipped", entity.type_name),
                ))?;
                continue;
            }
            if state.by_key.contains_key(entity.key.as_str()) {
                state.report(Diagnostic::error(
                    DiagnosticCode::DuplicateKey,
                    entity.key.as_str(),
                    "key already used by an earlier entity; later entity skipped",
                ))?;
                continue;
            }

            let attrs = source.get_attributes(&entity)?;
            let mut geometry = source.get_geometry(&entity)?;
            if let Some(g) = geometry.as_mut() {
                if g.bbox.is_some_and(|b| !b.is_valid()) {
                    g.bbox = None;
                    state.report(Diagnostic::warning(
                        DiagnosticCode::InvalidBoundingBox,
                        entity.key.as_str(),
                        "bounding box is not finite or has min > max; box dropped",
                    ))?;
                }
            }
            let relationships = source.get_relationships(&entity)?;

            let id = NodeId(state.nodes.len() as u32);
            let mut node = Node::new(id, entity.key.as_str(), normalize_type_tag(&entity.type_name));
            node.attributes = attrs.attributes;
            node.property_sets = attrs.property_sets;
            node.geometry = geometry;
            state.by_key.insert(Arc::clone(&node.guid), id);
            state.nodes.push(node);
            pending.push((id, relationships));
        }
        Ok(pending)
    }

    // ========================================================================
    // Pass 2: structural edges
    // ========================================================================

    fn resolve_relationships(
        &self,
        pending: &[(NodeId, Vec<RawRelationship>)],
        state: &mut BuildState<'_>,
    ) -> Result<Vec<ConnectionRequest>> {
        let mut requests = Vec::new();
        for (node, relationships) in pending {
            let key = state.nodes[node.index()].guid.to_string();
            for rel in relationships {
                let Some(mapping) = classify_relation(&rel.relation) else {
                    state.report(Diagnostic::error(
                        DiagnosticCode::UnknownRelation,
                        key.as_str(),
                        format!("unknown relation '{}'", rel.relation),
                    ))?;
                    continue;
                };
                if !self.config.allows(mapping.kind) {
                    continue;
                }
                if mapping.kind == EdgeKind::ConnectsTo {
                    requests.push(ConnectionRequest {
                        source: *node,
                        source_key: key.clone(),
                        relation: rel.relation.trim().to_string(),
                        target_key: rel.target.clone(),
                    });
                    continue;
                }
                let Some(&target) = state.by_key.get(rel.target.as_str()) else {
                    state.report(Diagnostic::error(
                        DiagnosticCode::MissingTarget,
                        key.as_str(),
                        format!("{} target '{}' not present in model", rel.relation, rel.target),
                    ))?;
                    continue;
                };
                if target == *node {
                    state.report(Diagnostic::error(
                        DiagnosticCode::SelfLoop,
                        key.as_str(),
                        format!("{} relates the entity to itself", rel.relation),
                    ))?;
                    continue;
                }
                let (s, t) = if mapping.reversed { (target, *node) } else { (*node, target) };
                state.add_edge(mapping.kind, s, t, Provenance::Structural, 1.0);
            }
        }
        Ok(requests)
    }

    // ========================================================================
    // Pass 3: connects_to
    // ========================================================================

    fn infer_connections(&self, requests: &[ConnectionRequest], state: &mut BuildState<'_>) -> Result<()> {
        if !self.config.allows(EdgeKind::ConnectsTo) {
            return Ok(());
        }
        let containers: BTreeMap<NodeId, NodeId> = state
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::ContainedIn)
            .fold(BTreeMap::new(), |mut acc, e| {
                acc.entry(e.source).or_insert(e.target);
                acc
            });

        let by_key = &state.by_key;
        let outcome = connects::infer(
            &state.nodes,
            |key| by_key.get(key).copied(),
            requests,
            &containers,
            &self.config.adjacency,
        );

        let mut problems = outcome.diagnostics.into_iter();
        if self.config.connects_to == ConnectsToPolicy::Fail {
            if let Some(first) = problems.next() {
                let mut err = state.fail(first);
                if let Error::GraphBuild { diagnostics, .. } = &mut err {
                    diagnostics.extend(problems);
                }
                return Err(err);
            }
        }
        for diagnostic in problems {
            state.report(diagnostic)?;
        }

        for partial in outcome.edges {
            state.add_edge(EdgeKind::ConnectsTo, partial.source, partial.target, partial.provenance, partial.confidence);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, GeometryHandle};
    use crate::source::{MemoryEntity, MemorySource};

    fn storey_with_walls() -> MemorySource {
        MemorySource::new("fp")
            .with_entity(MemoryEntity::new("st", "IfcBuildingStorey"))
            .with_entity(MemoryEntity::new("w1", "IFC4.IfcWall").relate("contained_in", "st"))
            .with_entity(
                MemoryEntity::new("w2", " IfcWall ")
                    .relate("IfcRelContainedInSpatialStructure", "st")
                    .relate("contained_in", "st"),
            )
    }

    #[test]
    fn test_normalize_type_tag() {
        assert_eq!(normalize_type_tag("IFC4.IfcWall"), "IfcWall");
        assert_eq!(normalize_type_tag("ifc2x3::IfcWall"), "IfcWall");
        assert_eq!(normalize_type_tag("  IfcSlab "), "IfcSlab");
        assert_eq!(normalize_type_tag("IfcDoor"), "IfcDoor");
    }

    #[test]
    fn test_classify_relation() {
        assert_eq!(
            classify_relation("contains"),
            Some(RelationMapping { kind: EdgeKind::ContainedIn, reversed: true })
        );
        assert_eq!(classify_relation("IfcRelNests").map(|m| m.kind), Some(EdgeKind::Aggregates));
        assert_eq!(classify_relation("IfcRelVoidsElement"), None);
    }

    #[test]
    fn test_nodes_in_enumeration_order_with_dedup_edges() {
        let build = GraphBuilder::new(RunConfig::default()).build(&storey_with_walls()).unwrap();
        let g = &build.graph;
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.node_by_guid("w1").unwrap().id, NodeId(1));
        assert_eq!(g.node_by_guid("w2").unwrap().type_tag, "IfcWall");
        assert_eq!(g.edge_count(), 2);
        assert!(build.diagnostics.is_empty());
        for id in g.edges_of_kind(EdgeKind::ContainedIn) {
            let edge = g.edge(*id).unwrap();
            assert_eq!(edge.provenance, Provenance::Structural);
            assert_eq!(edge.confidence, 1.0);
        }
    }

    #[test]
    fn test_reversed_relations() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("st", "IfcBuildingStorey").relate("contains", "w"))
            .with_entity(MemoryEntity::new("w", "IfcWall").relate("decomposes", "st"));
        let g = GraphBuilder::new(RunConfig::default()).build(&src).unwrap().graph;
        let w = g.node_by_guid("w").unwrap().id;
        let st = g.node_by_guid("st").unwrap().id;
        assert_eq!(g.contained_in(w), Some(st));
        assert_eq!(g.decomposes(w), Some(st));
    }

    #[test]
    fn test_malformed_relations_become_diagnostics() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("a", "IfcWall").relate("contained_in", "ghost").relate("bogus", "a"))
            .with_entity(MemoryEntity::new("", "IfcWall"))
            .with_entity(MemoryEntity::new("a", "IfcSlab"))
            .with_entity(MemoryEntity::new("b", "IfcWall").relate("type_of", "b"));
        let build = GraphBuilder::new(RunConfig::default()).build(&src).unwrap();
        let codes: Vec<_> = build.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::EmptyKey,
                DiagnosticCode::DuplicateKey,
                DiagnosticCode::MissingTarget,
                DiagnosticCode::UnknownRelation,
                DiagnosticCode::SelfLoop,
            ]
        );
        assert_eq!(build.graph.node_count(), 2);
        assert_eq!(build.graph.edge_count(), 0);
    }

    #[test]
    fn test_strict_mode_fails_on_first_error() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("a", "IfcWall").relate("contained_in", "ghost"))
            .with_entity(MemoryEntity::new("b", "IfcWall").relate("contained_in", "ghost2"));
        let err = GraphBuilder::new(RunConfig::default().strict()).build(&src).unwrap_err();
        match err {
            Error::GraphBuild { diagnostic, diagnostics } => {
                assert_eq!(diagnostic.code, DiagnosticCode::MissingTarget);
                assert_eq!(diagnostic.entity, "a");
                assert_eq!(diagnostics.len(), 1);
            }
            other => panic!("expected GraphBuild, got {other:?}"),
        }
    }

    #[test]
    fn test_whitelist_skips_kinds_silently() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("t", "IfcWallType"))
            .with_entity(MemoryEntity::new("w", "IfcWall").relate("type_of", "t").relate("connects_to", "t"));
        let config = RunConfig::default().with_edge_kinds([EdgeKind::ContainedIn]);
        let build = GraphBuilder::new(config).build(&src).unwrap();
        assert_eq!(build.graph.edge_count(), 0);
        assert!(build.diagnostics.is_empty());
    }

    #[test]
    fn test_connects_to_policy_is_independent_of_strict() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("a", "IfcPipeSegment").relate("IfcRelConnectsPorts", "ghost"));

        let build = GraphBuilder::new(RunConfig::default().strict()).build(&src).unwrap();
        assert_eq!(build.diagnostics.len(), 1);

        let config = RunConfig::default().with_connects_to(ConnectsToPolicy::Fail);
        let err = GraphBuilder::new(config).build(&src).unwrap_err();
        assert!(matches!(err, Error::GraphBuild { .. }));
    }

    #[test]
    fn test_invalid_bbox_is_dropped() {
        let bad = GeometryHandle::new("g").with_bbox(BoundingBox::new([1.0; 3], [0.0; 3]));
        let src = MemorySource::new("fp").with_entity(MemoryEntity::new("a", "IfcWall").geometry(bad));
        let build = GraphBuilder::new(RunConfig::default().strict()).build(&src).unwrap();
        let node = build.graph.node_by_guid("a").unwrap();
        assert_eq!(node.geometry.as_ref().map(|g| g.handle.as_str()), Some("g"));
        assert!(node.geometry.as_ref().unwrap().bbox.is_none());
        assert_eq!(build.diagnostics[0].code, DiagnosticCode::InvalidBoundingBox);
    }

    #[test]
    fn test_adjacency_heuristic_edges() {
        let bbox = |x: f64| GeometryHandle::new(format!("g{x}")).with_bbox(BoundingBox::new([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]));
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("st", "IfcBuildingStorey"))
            .with_entity(MemoryEntity::new("a", "IfcWall").relate("contained_in", "st").geometry(bbox(0.0)))
            .with_entity(MemoryEntity::new("b", "IfcWall").relate("contained_in", "st").geometry(bbox(1.0)));
        let build = GraphBuilder::new(RunConfig::default().with_adjacency(0.01, 0.6)).build(&src).unwrap();
        let connects: Vec<_> = build
            .graph
            .edges_of_kind(EdgeKind::ConnectsTo)
            .iter()
            .filter_map(|&id| build.graph.edge(id))
            .collect();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].provenance, Provenance::Heuristic { rule: "bbox_adjacency".into() });
        assert_eq!(connects[0].confidence, 0.6);
    }
}
