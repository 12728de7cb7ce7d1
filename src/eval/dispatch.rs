//! Built-in dispatch: `BuiltinOp` → value.

use smallvec::SmallVec;

use crate::builtins::BuiltinOp;
use crate::check::{EdgeSelector, TypedExpr};
use crate::graph::builder::normalize_type_tag;
use crate::graph::SemanticGraph;
use crate::model::{Direction, Node, NodeId, Value};
use super::context::ContextStack;
use super::Evaluator;

static NULL: Value = Value::Null;

fn node_ref(graph: &SemanticGraph, id: NodeId) -> Value {
    graph.node(id).map_or(Value::Null, |n| Value::NodeRef(n.to_ref()))
}

fn node_refs(graph: &SemanticGraph, ids: Vec<NodeId>) -> Value {
    Value::List(ids.into_iter().map(|id| node_ref(graph, id)).collect())
}

pub(super) fn call(
    ev: &Evaluator<'_>,
    op: BuiltinOp,
    args: &[TypedExpr],
    selector: Option<EdgeSelector>,
    stack: &mut ContextStack,
) -> Value {
    let values: SmallVec<[Value; 2]> = args.iter().map(|a| ev.evaluate(a, stack)).collect();
    let null_aware = matches!(op, BuiltinOp::Exists | BuiltinOp::PsetHas | BuiltinOp::GeomExists);
    if !null_aware && values.iter().any(Value::is_null) {
        return Value::Null;
    }
    let graph = ev.graph();
    let arg = |i: usize| values.get(i).unwrap_or(&NULL);

    match op {
        // Any context
        BuiltinOp::Exists => Value::Bool(!arg(0).is_null()),
        BuiltinOp::Len => arg(0).as_list().map_or(Value::Null, |l| Value::Int(l.len() as i64)),
        BuiltinOp::TextLower => arg(0).as_str().map_or(Value::Null, |s| Value::String(s.to_lowercase())),
        BuiltinOp::TextConcat => match (arg(0).as_str(), arg(1).as_str()) {
            (Some(a), Some(b)) => Value::String(format!("{a}{b}")),
            _ => Value::Null,
        },
        BuiltinOp::BatchCount => Value::Int(stack.batch_size() as i64),

        // Edge context
        BuiltinOp::EdgeKind
        | BuiltinOp::EdgeSource
        | BuiltinOp::EdgeTarget
        | BuiltinOp::EdgeConfidence
        | BuiltinOp::EdgeProvenance => {
            let Some(edge) = stack.edge().and_then(|id| graph.edge(id)) else {
                return Value::Null;
            };
            match op {
                BuiltinOp::EdgeKind => Value::from(edge.kind.as_str()),
                BuiltinOp::EdgeSource => node_ref(graph, edge.source),
                BuiltinOp::EdgeTarget => node_ref(graph, edge.target),
                BuiltinOp::EdgeConfidence => Value::Float(edge.confidence),
                _ => Value::String(edge.provenance.label()),
            }
        }

        // Node context
        _ => {
            let Some(node) = stack.node().and_then(|id| graph.node(id)) else {
                return Value::Null;
            };
            node_call(graph, node, op, &values, selector)
        }
    }
}

fn node_call(
    graph: &SemanticGraph,
    node: &Node,
    op: BuiltinOp,
    values: &[Value],
    selector: Option<EdgeSelector>,
) -> Value {
    let text = |i: usize| values.get(i).and_then(Value::as_str);
    match op {
        BuiltinOp::Guid => Value::String(node.guid.to_string()),
        BuiltinOp::IfcType => Value::String(node.type_tag.clone()),
        BuiltinOp::IfcName => node.name().map_or(Value::Null, Value::from),
        BuiltinOp::IfcIsA => text(0).map_or(Value::Null, |t| Value::Bool(node.type_tag == normalize_type_tag(t))),
        BuiltinOp::IfcAttr => text(0)
            .and_then(|k| node.attribute(k))
            .cloned()
            .unwrap_or(Value::Null),
        BuiltinOp::PsetGet | BuiltinOp::PsetText | BuiltinOp::PsetNumeric => {
            let (Some(set), Some(key)) = (text(0), text(1)) else {
                return Value::Null;
            };
            let Some(value) = node.property(set, key) else {
                return Value::Null;
            };
            match op {
                BuiltinOp::PsetText => value.as_str().map_or(Value::Null, Value::from),
                BuiltinOp::PsetNumeric => value.as_float().map_or(Value::Null, Value::Float),
                _ => value.clone(),
            }
        }
        BuiltinOp::PsetHas => Value::Bool(text(0).is_some_and(|set| node.has_property_set(set))),
        BuiltinOp::GeomExists => Value::Bool(node.geometry.is_some()),
        BuiltinOp::GeomBbox => node
            .geometry
            .as_ref()
            .and_then(|g| g.bbox)
            .map_or(Value::Null, |b| b.to_value()),
        BuiltinOp::GeomGet => node.geometry.clone().map_or(Value::Null, Value::Geometry),
        BuiltinOp::Degree => {
            let sel = selector.unwrap_or(EdgeSelector { kind: None, direction: Direction::Both });
            Value::Int(graph.degree(node.id, sel.direction, sel.kind) as i64)
        }
        BuiltinOp::ContainedIn => graph.contained_in(node.id).map_or(Value::Null, |id| node_ref(graph, id)),
        BuiltinOp::ContainerChain => node_refs(graph, graph.container_chain(node.id)),
        BuiltinOp::TypeOf => graph.type_of(node.id).map_or(Value::Null, |id| node_ref(graph, id)),
        BuiltinOp::Decomposes => graph.decomposes(node.id).map_or(Value::Null, |id| node_ref(graph, id)),
        BuiltinOp::Aggregates => node_refs(graph, graph.aggregates(node.id)),
        BuiltinOp::ConnectsTo => node_refs(graph, graph.connects_to(node.id)),
        // Non-node operations are handled by the caller.
        _ => Value::Null,
    }
}
