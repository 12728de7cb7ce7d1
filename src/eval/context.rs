//! Evaluation Context Manager.
//!
//! The stack always holds the Batch frame of the running block at the bottom,
//! one element frame above it while an element is being evaluated, and one
//! more frame per nested `within`. It is threaded through evaluation
//! explicitly; there is no ambient "current node".

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use crate::model::{EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Node,
    Edge,
    Batch,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextKind::Node => "Node",
            ContextKind::Edge => "Edge",
            ContextKind::Batch => "Batch",
        })
    }
}

/// One frame: what the context is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Node(NodeId),
    Edge(EdgeId),
    /// The element set of the running block.
    Batch { size: usize },
}

impl Binding {
    pub fn kind(self) -> ContextKind {
        match self {
            Binding::Node(_) => ContextKind::Node,
            Binding::Edge(_) => ContextKind::Edge,
            Binding::Batch { .. } => ContextKind::Batch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextStack {
    frames: SmallVec<[Binding; 4]>,
}

impl ContextStack {
    /// Stack holding only the Batch frame.
    pub fn new(batch_size: usize) -> Self {
        let mut frames = SmallVec::new();
        frames.push(Binding::Batch { size: batch_size });
        Self { frames }
    }

    pub fn push(&mut self, binding: Binding) {
        self.frames.push(binding);
    }

    /// Pop the top frame. The Batch frame at the bottom stays.
    pub fn pop(&mut self) -> Option<Binding> {
        if self.frames.len() > 1 { self.frames.pop() } else { None }
    }

    /// Run `f` with `binding` pushed, popping it afterwards.
    pub fn scoped<R>(&mut self, binding: Binding, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(binding);
        let result = f(self);
        self.pop();
        result
    }

    pub fn current(&self) -> Binding {
        self.frames.last().copied().unwrap_or(Binding::Batch { size: 0 })
    }

    pub fn kind(&self) -> ContextKind {
        self.current().kind()
    }

    pub fn node(&self) -> Option<NodeId> {
        match self.current() {
            Binding::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn edge(&self) -> Option<EdgeId> {
        match self.current() {
            Binding::Edge(id) => Some(id),
            _ => None,
        }
    }

    pub fn batch_size(&self) -> usize {
        match self.frames.first() {
            Some(Binding::Batch { size }) => *size,
            _ => 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_frame_is_permanent() {
        let mut stack = ContextStack::new(7);
        assert_eq!(stack.kind(), ContextKind::Batch);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.batch_size(), 7);
    }

    #[test]
    fn test_scoped_push() {
        let mut stack = ContextStack::new(2);
        stack.push(Binding::Node(NodeId(1)));
        let inner = stack.scoped(Binding::Edge(EdgeId(4)), |s| (s.kind(), s.edge(), s.depth()));
        assert_eq!(inner, (ContextKind::Edge, Some(EdgeId(4)), 3));
        assert_eq!(stack.node(), Some(NodeId(1)));
        assert_eq!(stack.depth(), 2);
    }
}
