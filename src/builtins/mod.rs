//! # Built-in Function Registry
//!
//! A fixed table mapping each built-in name to its signature, the contexts it
//! may be called from, its null policy and the operation the evaluator
//! dispatches to. The type checker resolves every call to a [`BuiltinId`];
//! after that, evaluation never looks at names again.
//!
//! ## Families
//!
//! | Prefix | Context | Reads |
//! |--------|---------|-------|
//! | `ifc.*`, `guid` | Node | type tag, attributes |
//! | `pset.*` | Node | property sets |
//! | `geom.*` | Node | geometry handle |
//! | `degree`, relation names | Node | adjacency |
//! | `edge.*` | Edge | the bound edge |
//! | `exists`, `len`, `text.*`, `batch.count` | any | arguments / batch |

use std::fmt;

use hashbrown::HashMap;

use crate::eval::ContextKind;
use crate::recipe::{TypeRef, ValueType};

/// Index of a built-in in the registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinId(pub u16);

/// Operation the evaluator performs for a built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    Guid,
    IfcType,
    IfcName,
    IfcIsA,
    IfcAttr,
    PsetGet,
    PsetText,
    PsetNumeric,
    PsetHas,
    GeomExists,
    GeomBbox,
    GeomGet,
    Degree,
    ContainedIn,
    ContainerChain,
    TypeOf,
    Decomposes,
    Aggregates,
    ConnectsTo,
    EdgeKind,
    EdgeSource,
    EdgeTarget,
    EdgeConfidence,
    EdgeProvenance,
    Exists,
    Len,
    TextLower,
    TextConcat,
    BatchCount,
}

/// Contexts a built-in may be called from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Node,
    Edge,
    Any,
}

impl Scope {
    pub fn allows(self, context: ContextKind) -> bool {
        match self {
            Scope::Any => true,
            Scope::Node => context == ContextKind::Node,
            Scope::Edge => context == ContextKind::Edge,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Node => "Node",
            Scope::Edge => "Edge",
            Scope::Any => "any",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// A Null argument makes the result Null.
    Propagate,
    /// Inspects Null arguments and always returns a non-Null Bool.
    NullAware,
    /// Result is never Null.
    NeverNull,
}

/// Declared parameter of a built-in.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(ValueType),
    /// String literal naming an edge kind, or `"*"` for any kind.
    EdgeKindSelector,
    /// String literal `"in"`, `"out"` or `"both"`.
    DirectionSelector,
}

impl Param {
    pub fn is_selector(&self) -> bool {
        !matches!(self, Param::Value(_))
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Value(ty) => write!(f, "{ty}"),
            Param::EdgeKindSelector => f.write_str("edge kind selector"),
            Param::DirectionSelector => f.write_str("direction selector"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub op: BuiltinOp,
    pub params: Vec<Param>,
    pub returns: TypeRef,
    pub scope: Scope,
    pub null_policy: NullPolicy,
}

impl BuiltinSpec {
    /// Result type given the argument types.
    pub fn result_type(&self, args: &[TypeRef]) -> TypeRef {
        match self.null_policy {
            NullPolicy::Propagate => {
                let any_nullable = args.iter().any(|a| a.nullable);
                self.returns.clone().with_nullable(any_nullable)
            }
            NullPolicy::NullAware | NullPolicy::NeverNull => self.returns.clone(),
        }
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns)
    }
}

/// The built-in table.
#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    specs: Vec<BuiltinSpec>,
    by_name: HashMap<&'static str, BuiltinId>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl BuiltinRegistry {
    pub fn standard() -> Self {
        use BuiltinOp as Op;
        use NullPolicy::{NeverNull, NullAware, Propagate};
        use ValueType as T;

        let s = || Param::Value(T::String);
        let node_list = || TypeRef::new(T::list_of(T::NodeRef));
        let mut reg = Self { specs: Vec::new(), by_name: HashMap::new() };

        // Node context
        reg.add("guid", Op::Guid, vec![], TypeRef::string(), Scope::Node, Propagate);
        reg.add("ifc.type", Op::IfcType, vec![], TypeRef::string(), Scope::Node, Propagate);
        reg.add("ifc.name", Op::IfcName, vec![], TypeRef::nullable(T::String), Scope::Node, Propagate);
        reg.add("ifc.is_a", Op::IfcIsA, vec![s()], TypeRef::bool(), Scope::Node, Propagate);
        reg.add("ifc.attr", Op::IfcAttr, vec![s()], TypeRef::nullable(T::Any), Scope::Node, Propagate);
        reg.add("pset.get", Op::PsetGet, vec![s(), s()], TypeRef::nullable(T::Any), Scope::Node, Propagate);
        reg.add("pset.text", Op::PsetText, vec![s(), s()], TypeRef::nullable(T::String), Scope::Node, Propagate);
        reg.add("pset.numeric", Op::PsetNumeric, vec![s(), s()], TypeRef::nullable(T::Float), Scope::Node, Propagate);
        reg.add("pset.has", Op::PsetHas, vec![s()], TypeRef::bool(), Scope::Node, NullAware);
        reg.add("geom.exists", Op::GeomExists, vec![], TypeRef::bool(), Scope::Node, NullAware);
        reg.add("geom.bbox", Op::GeomBbox, vec![], TypeRef::nullable(T::list_of(T::Float)), Scope::Node, Propagate);
        reg.add("geom.get", Op::GeomGet, vec![], TypeRef::nullable(T::Geometry), Scope::Node, Propagate);
        reg.add(
            "degree",
            Op::Degree,
            vec![Param::EdgeKindSelector, Param::DirectionSelector],
            TypeRef::int(),
            Scope::Node,
            NeverNull,
        );
        reg.add("contained_in", Op::ContainedIn, vec![], TypeRef::nullable(T::NodeRef), Scope::Node, Propagate);
        reg.add("container_chain", Op::ContainerChain, vec![], node_list(), Scope::Node, Propagate);
        reg.add("type_of", Op::TypeOf, vec![], TypeRef::nullable(T::NodeRef), Scope::Node, Propagate);
        reg.add("decomposes", Op::Decomposes, vec![], TypeRef::nullable(T::NodeRef), Scope::Node, Propagate);
        reg.add("aggregates", Op::Aggregates, vec![], node_list(), Scope::Node, Propagate);
        reg.add("connects_to", Op::ConnectsTo, vec![], node_list(), Scope::Node, Propagate);

        // Edge context
        reg.add("edge.kind", Op::EdgeKind, vec![], TypeRef::string(), Scope::Edge, Propagate);
        reg.add("edge.source", Op::EdgeSource, vec![], TypeRef::new(T::NodeRef), Scope::Edge, Propagate);
        reg.add("edge.target", Op::EdgeTarget, vec![], TypeRef::new(T::NodeRef), Scope::Edge, Propagate);
        reg.add("edge.confidence", Op::EdgeConfidence, vec![], TypeRef::float(), Scope::Edge, Propagate);
        reg.add("edge.provenance", Op::EdgeProvenance, vec![], TypeRef::string(), Scope::Edge, Propagate);

        // Any context
        reg.add("exists", Op::Exists, vec![Param::Value(T::Any)], TypeRef::bool(), Scope::Any, NullAware);
        reg.add("len", Op::Len, vec![Param::Value(T::list_of(T::Any))], TypeRef::int(), Scope::Any, Propagate);
        reg.add("text.lower", Op::TextLower, vec![s()], TypeRef::string(), Scope::Any, Propagate);
        reg.add("text.concat", Op::TextConcat, vec![s(), s()], TypeRef::string(), Scope::Any, Propagate);
        reg.add("batch.count", Op::BatchCount, vec![], TypeRef::int(), Scope::Any, Propagate);

        reg
    }

    fn add(
        &mut self,
        name: &'static str,
        op: BuiltinOp,
        params: Vec<Param>,
        returns: TypeRef,
        scope: Scope,
        null_policy: NullPolicy,
    ) {
        let id = BuiltinId(self.specs.len() as u16);
        self.specs.push(BuiltinSpec { name, op, params, returns, scope, null_policy });
        self.by_name.insert(name, id);
    }

    pub fn lookup(&self, name: &str) -> Option<(BuiltinId, &BuiltinSpec)> {
        let id = *self.by_name.get(name)?;
        Some((id, &self.specs[id.0 as usize]))
    }

    pub fn get(&self, id: BuiltinId) -> Option<&BuiltinSpec> {
        self.specs.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// All built-ins in table order.
    pub fn iter(&self) -> impl Iterator<Item = &BuiltinSpec> + '_ {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let reg = BuiltinRegistry::standard();
        let (id, spec) = reg.lookup("pset.get").unwrap();
        assert_eq!(spec.op, BuiltinOp::PsetGet);
        assert_eq!(reg.get(id).map(|s| s.name), Some("pset.get"));
        assert!(reg.lookup("pset.nope").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let reg = BuiltinRegistry::standard();
        assert_eq!(reg.len(), reg.by_name.len());
    }

    #[test]
    fn test_scopes() {
        let reg = BuiltinRegistry::standard();
        let scope = |name| reg.lookup(name).map(|(_, s)| s.scope);
        assert_eq!(scope("guid"), Some(Scope::Node));
        assert_eq!(scope("edge.kind"), Some(Scope::Edge));
        assert_eq!(scope("len"), Some(Scope::Any));
        assert!(Scope::Any.allows(ContextKind::Batch));
        assert!(!Scope::Node.allows(ContextKind::Edge));
    }

    #[test]
    fn test_result_type_follows_null_policy() {
        let reg = BuiltinRegistry::standard();
        let (_, lower) = reg.lookup("text.lower").unwrap();
        assert_eq!(lower.result_type(&[TypeRef::nullable(ValueType::String)]), TypeRef::nullable(ValueType::String));
        assert_eq!(lower.result_type(&[TypeRef::string()]), TypeRef::string());
        let (_, exists) = reg.lookup("exists").unwrap();
        assert_eq!(exists.result_type(&[TypeRef::null()]), TypeRef::bool());
    }

    #[test]
    fn test_signature() {
        let reg = BuiltinRegistry::standard();
        let (_, degree) = reg.lookup("degree").unwrap();
        assert_eq!(degree.signature(), "degree(edge kind selector, direction selector) -> Int");
    }
}
