//! End-to-end graph construction through the runtime: diagnostics, strict
//! mode, connects_to inference and its failure policy.

use openbimdl::{
    Block, BoundingBox, ConnectsToPolicy, DiagnosticCode, Error, Expr, GeometryHandle, MemoryEntity,
    MemorySink, MemorySource, Recipe, RunConfig, RunInputs, Runtime, Severity, Value,
};
use pretty_assertions::assert_eq;

fn boxed(x: f64) -> GeometryHandle {
    GeometryHandle::new(format!("geom-{x}")).with_bbox(BoundingBox::new([x, 0.0, 0.0], [x + 1.0, 0.2, 3.0]))
}

fn model() -> MemorySource {
    MemorySource::new("fp-graph")
        .with_entity(MemoryEntity::new("st", "IfcBuildingStorey"))
        .with_entity(MemoryEntity::new("w1", "IfcWall").relate("contained_in", "st").geometry(boxed(0.0)))
        .with_entity(MemoryEntity::new("w2", "IfcWall").relate("contained_in", "st").geometry(boxed(1.0)))
        .with_entity(MemoryEntity::new("w3", "IfcWall").relate("contained_in", "st").geometry(boxed(5.0)))
        .with_entity(
            MemoryEntity::new("p1", "IfcPipeSegment")
                .relate("contained_in", "st")
                .relate("IfcRelConnectsPorts", "w3")
                .relate("IfcRelConnectsPorts", "nowhere"),
        )
        .with_entity(MemoryEntity::new("x", "IfcWall").relate("contained_in", "attic"))
}

fn edges_recipe() -> Recipe {
    Recipe::new()
        .block(Block::view("links").from_edges(["connects_to"]).select([
            ("source", Expr::within(Expr::call("edge.source", vec![]), Expr::call("guid", vec![]))),
            ("target", Expr::within(Expr::call("edge.target", vec![]), Expr::call("guid", vec![]))),
            ("provenance", Expr::call("edge.provenance", vec![])),
            ("confidence", Expr::call("edge.confidence", vec![])),
        ]))
        .export_table("links", "jsonl", "links.jsonl")
}

fn runtime(config: RunConfig) -> Runtime {
    Runtime::new(config).unwrap()
}

#[test]
fn lenient_build_reports_diagnostics_and_counts_them() {
    let src = model();
    let sink = MemorySink::new();
    let config = RunConfig::default().with_adjacency(0.01, 0.4);
    let report = runtime(config)
        .run(RunInputs { recipe: &edges_recipe(), recipe_hash: "h".into(), source: &src }, &sink, &sink)
        .unwrap();

    let codes: Vec<(DiagnosticCode, Severity)> =
        report.diagnostics.iter().map(|d| (d.code, d.severity)).collect();
    assert_eq!(
        codes,
        vec![
            (DiagnosticCode::MissingTarget, Severity::Error),
            (DiagnosticCode::MissingTarget, Severity::Warning),
        ]
    );
    assert_eq!(report.manifest.diagnostics, 2);

    let links = report.dataset.table("links").unwrap();
    assert_eq!(
        links.records,
        vec![
            vec![
                Value::from("p1"),
                Value::from("w3"),
                Value::from("explicit:IfcRelConnectsPorts"),
                Value::Float(1.0),
            ],
            vec![
                Value::from("w1"),
                Value::from("w2"),
                Value::from("heuristic:bbox_adjacency"),
                Value::Float(0.4),
            ],
        ]
    );
    assert_eq!(report.manifest.stats.heuristic_edges, 1);
}

#[test]
fn every_edge_endpoint_exists() {
    let src = model();
    let sink = MemorySink::new();
    let report = runtime(RunConfig::default().with_adjacency(0.01, 0.5))
        .run(RunInputs { recipe: &edges_recipe(), recipe_hash: "h".into(), source: &src }, &sink, &sink)
        .unwrap();
    let g = &report.graph;
    for edge in g.edges() {
        assert!(g.node(edge.source).is_some());
        assert!(g.node(edge.target).is_some());
    }
    // The dangling containment of `x` is dropped, `x` itself stays.
    let x = g.node_by_guid("x").unwrap();
    assert_eq!(g.contained_in(x.id), None);
}

#[test]
fn strict_build_fails_without_touching_the_sink() {
    let src = model();
    let sink = MemorySink::new();
    let err = runtime(RunConfig::default().strict())
        .run(RunInputs { recipe: &edges_recipe(), recipe_hash: "h".into(), source: &src }, &sink, &sink)
        .unwrap_err();
    match err {
        Error::GraphBuild { diagnostic, diagnostics } => {
            assert_eq!(diagnostic.code, DiagnosticCode::MissingTarget);
            assert_eq!(diagnostic.entity, "x");
            assert_eq!(diagnostics.len(), 1);
        }
        other => panic!("expected GraphBuild, got {other:?}"),
    }
    assert!(sink.paths().is_empty());
    assert!(sink.manifests().is_empty());
}

#[test]
fn connects_to_fail_policy_aborts() {
    let src = MemorySource::new("fp")
        .with_entity(MemoryEntity::new("p1", "IfcPipeSegment").relate("connects_to", "nowhere"))
        .with_entity(MemoryEntity::new("p2", "IfcPipeSegment").relate("connects_to", "p2"));
    let sink = MemorySink::new();
    let err = runtime(RunConfig::default().with_connects_to(ConnectsToPolicy::Fail))
        .run(RunInputs { recipe: &edges_recipe(), recipe_hash: "h".into(), source: &src }, &sink, &sink)
        .unwrap_err();
    let Error::GraphBuild { diagnostic, diagnostics } = err else {
        panic!("expected GraphBuild");
    };
    assert_eq!(diagnostic.code, DiagnosticCode::MissingTarget);
    assert_eq!(
        diagnostics.iter().map(|d| d.code).collect::<Vec<_>>(),
        vec![DiagnosticCode::MissingTarget, DiagnosticCode::SelfLoop]
    );
}

#[test]
fn edge_kind_whitelist_limits_the_graph() {
    let src = model();
    let sink = MemorySink::new();
    let config = RunConfig::default().with_edge_kinds([openbimdl::EdgeKind::ContainedIn]);
    let report = runtime(config)
        .run(RunInputs { recipe: &edges_recipe(), recipe_hash: "h".into(), source: &src }, &sink, &sink)
        .unwrap();
    assert!(report.dataset.table("links").unwrap().records.is_empty());
    assert_eq!(sink.get_string("links.jsonl").as_deref(), Some(""));
    assert_eq!(report.graph.edge_count(), 4);
}
