//! Access to the object graph templates are evaluated against.
//!
//! The engine never owns the model: it reaches nodes through the [`Model`]
//! trait by [`ObjectId`]. [`MemoryModel`] is a small in-memory
//! implementation, loadable from JSON.

use std::fmt;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::value::{TypeRef, Value};

mod memory;

pub use memory::MemoryModel;

/// Handle of a model node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown model node {0}")]
    UnknownNode(ObjectId),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("invalid model document: {message}")]
    InvalidDocument { message: String },

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),
}

/// Typed object graph.
///
/// Mutations take `&self`: implementations synchronise internally, since
/// templates may change the model while it is being traversed.
pub trait Model: Send + Sync {
    /// Type of `node`, `None` for an unknown node.
    fn type_name(&self, node: ObjectId) -> Option<String>;

    /// Is `node` of type `type_name` or one of its subtypes?
    fn is_instance_of(&self, node: ObjectId, type_name: &str) -> bool;

    /// Value of a feature. `None` when the node has no such feature,
    /// `Some(Value::Absent)` when it exists but is unset.
    fn feature_value(&self, node: ObjectId, feature: &str) -> Option<Value>;

    fn set_feature_value(&self, node: ObjectId, feature: &str, value: Value) -> Result<(), ModelError>;

    /// Append to a many-valued feature; an unset feature becomes a list.
    fn add_to_feature(&self, node: ObjectId, feature: &str, value: Value) -> Result<(), ModelError>;

    /// Remove every element equal to `value`.
    fn remove_from_feature(&self, node: ObjectId, feature: &str, value: &Value) -> Result<(), ModelError>;

    /// Directly contained nodes, in feature order.
    fn children(&self, node: ObjectId) -> Vec<ObjectId>;

    fn container(&self, node: ObjectId) -> Option<ObjectId>;

    fn is_containment(&self, node: ObjectId, feature: &str) -> bool;

    /// Human readable rendering of a node.
    fn label(&self, node: ObjectId) -> String;

    fn roots(&self) -> Vec<ObjectId>;

    /// Declared type of `feature` on `type_name`, for static typing.
    fn feature_type(&self, type_name: &str, feature: &str) -> Option<TypeRef>;
}

/// Every node reachable from the roots, depth first, parents before
/// children.
pub fn all_nodes(model: &dyn Model) -> Vec<ObjectId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack: Vec<ObjectId> = model.roots().into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        out.push(node);
        stack.extend(model.children(node).into_iter().rev());
    }
    out
}
