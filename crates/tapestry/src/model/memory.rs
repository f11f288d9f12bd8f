//! In-memory [`Model`] implementation.
//!
//! Documents look like this:
//!
//! ```json
//! {
//!   "types": {
//!     "Named":  { "features": { "name": "text" } },
//!     "Entity": { "supertypes": ["Named"], "features": { "attributes": "Attribute*" } }
//!   },
//!   "roots": [
//!     { "type": "Entity", "$id": "user", "name": "User",
//!       "attributes": [ { "type": "Attribute", "name": "id", "owner": { "$ref": "user" } } ] }
//!   ]
//! }
//! ```
//!
//! Objects carrying `type` are contained in the feature they appear in;
//! `{"$ref": id}` points to the object declaring `"$id": id` without
//! containing it. `null` marks a feature as present but unset.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value as Json;

use super::{Model, ModelError, ObjectId};
use crate::value::{TypeRef, Value, ValueNode};

const TYPE_KEY: &str = "type";
const ID_KEY: &str = "$id";
const REF_KEY: &str = "$ref";
/// Feature used as the label of a node when set.
const LABEL_FEATURE: &str = "name";

#[derive(Debug, Default, Clone)]
struct TypeDef {
    supertypes: Vec<String>,
    features: Vec<(String, TypeRef)>,
}

#[derive(Debug, Clone)]
struct Object {
    type_name: String,
    features: Vec<(String, Value)>,
    containments: FxHashSet<String>,
    container: Option<ObjectId>,
}

impl Object {
    fn get(&self, feature: &str) -> Option<&Value> {
        self.features.iter().find(|(name, _)| name == feature).map(|(_, v)| v)
    }

    fn slot(&mut self, feature: &str) -> &mut Value {
        let index = match self.features.iter().position(|(name, _)| name == feature) {
            Some(index) => index,
            None => {
                self.features.push((feature.to_string(), Value::Absent));
                self.features.len() - 1
            }
        };
        &mut self.features[index].1
    }
}

#[derive(Debug, Default)]
struct ModelData {
    objects: Vec<Object>,
    roots: Vec<ObjectId>,
    types: FxHashMap<String, TypeDef>,
}

impl ModelData {
    fn object(&self, node: ObjectId) -> Result<&Object, ModelError> {
        self.objects
            .get(node.0 as usize)
            .ok_or(ModelError::UnknownNode(node))
    }

    fn object_mut(&mut self, node: ObjectId) -> Result<&mut Object, ModelError> {
        self.objects
            .get_mut(node.0 as usize)
            .ok_or(ModelError::UnknownNode(node))
    }

    fn create(&mut self, type_name: &str, container: Option<ObjectId>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object {
            type_name: type_name.to_string(),
            features: Vec::new(),
            containments: FxHashSet::default(),
            container,
        });
        id
    }

    /// `type_name` followed by all its supertypes, each once.
    fn lineage(&self, type_name: &str) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut pending = vec![type_name.to_string()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(def) = self.types.get(&current) {
                pending.extend(def.supertypes.iter().rev().cloned());
            }
            out.push(current);
        }
        out
    }

    fn declared_feature(&self, type_name: &str, feature: &str) -> Option<TypeRef> {
        self.lineage(type_name).iter().find_map(|t| {
            self.types.get(t).and_then(|def| {
                def.features
                    .iter()
                    .find(|(name, _)| name == feature)
                    .map(|(_, ty)| ty.clone())
            })
        })
    }
}

/// Thread-safe in-memory model.
#[derive(Debug, Default)]
pub struct MemoryModel {
    data: RwLock<ModelData>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `type_name` with its supertypes. Declaring again replaces
    /// the supertypes and keeps the features.
    pub fn declare_type(&self, type_name: &str, supertypes: &[&str]) {
        let mut data = self.data.write();
        let def = data.types.entry(type_name.to_string()).or_default();
        def.supertypes = supertypes.iter().map(|s| s.to_string()).collect();
    }

    pub fn declare_feature(&self, type_name: &str, feature: &str, ty: TypeRef) {
        let mut data = self.data.write();
        let def = data.types.entry(type_name.to_string()).or_default();
        match def.features.iter_mut().find(|(name, _)| name == feature) {
            Some(slot) => slot.1 = ty,
            None => def.features.push((feature.to_string(), ty)),
        }
    }

    pub fn create_root(&self, type_name: &str) -> ObjectId {
        let mut data = self.data.write();
        let id = data.create(type_name, None);
        data.roots.push(id);
        id
    }

    /// Create a node contained in `feature` of `parent`. The feature
    /// becomes many-valued.
    pub fn create_child(&self, parent: ObjectId, feature: &str, type_name: &str) -> Result<ObjectId, ModelError> {
        let mut data = self.data.write();
        data.object(parent)?;
        let id = data.create(type_name, Some(parent));
        let object = data.object_mut(parent)?;
        object.containments.insert(feature.to_string());
        push_element(object.slot(feature), Value::Node(id));
        Ok(id)
    }

    /// Load a model document; see the module documentation for the format.
    pub fn from_json(document: &Json) -> Result<Self, ModelError> {
        let model = MemoryModel::new();
        let roots = match document {
            Json::Object(map) if map.contains_key("roots") || map.contains_key("types") => {
                if let Some(types) = map.get("types") {
                    model.load_types(types)?;
                }
                match map.get("roots") {
                    Some(Json::Array(roots)) => roots.clone(),
                    Some(other) => vec![other.clone()],
                    None => Vec::new(),
                }
            }
            Json::Array(roots) => roots.clone(),
            single => vec![single.clone()],
        };

        let mut loader = JsonLoader::default();
        {
            let mut data = model.data.write();
            for root in &roots {
                let id = loader.object(&mut data, root, None)?;
                data.roots.push(id);
            }
            loader.resolve(&mut data)?;
        }
        Ok(model)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let document: Json = serde_json::from_str(text).map_err(|e| ModelError::InvalidDocument {
            message: e.to_string(),
        })?;
        Self::from_json(&document)
    }

    fn load_types(&self, types: &Json) -> Result<(), ModelError> {
        let Json::Object(types) = types else {
            return Err(invalid("'types' must be an object"));
        };
        for (name, def) in types {
            let supertypes: Vec<&str> = def
                .get("supertypes")
                .and_then(Json::as_array)
                .map(|list| list.iter().filter_map(Json::as_str).collect())
                .unwrap_or_default();
            self.declare_type(name, &supertypes);
            if let Some(Json::Object(features)) = def.get("features") {
                for (feature, ty) in features {
                    let ty = ty
                        .as_str()
                        .ok_or_else(|| invalid(format!("type of '{name}.{feature}' must be a string")))?;
                    self.declare_feature(name, feature, parse_type(ty));
                }
            }
        }
        Ok(())
    }
}

/// `text`, `int`, `Entity`, `Attribute*` (list of).
fn parse_type(text: &str) -> TypeRef {
    if let Some(element) = text.strip_suffix('*') {
        return TypeRef::list_of(parse_type(element));
    }
    match text {
        "any" => TypeRef::Any,
        "bool" => TypeRef::Bool,
        "int" => TypeRef::Int,
        "real" => TypeRef::Real,
        "text" => TypeRef::Text,
        other => TypeRef::Node(other.to_string()),
    }
}

fn invalid(message: impl Into<String>) -> ModelError {
    ModelError::InvalidDocument {
        message: message.into(),
    }
}

fn push_element(slot: &mut Value, element: Value) {
    match slot {
        Value::List(items) => items.push(ValueNode::new(element)),
        Value::Absent => *slot = Value::List(vec![ValueNode::new(element)]),
        single => {
            let previous = std::mem::take(single);
            *single = Value::List(vec![ValueNode::new(previous), ValueNode::new(element)]);
        }
    }
}

/// Where a `$ref` has to be patched in once every object exists.
struct PendingRef {
    node: ObjectId,
    feature: String,
    index: Option<usize>,
    target: String,
}

#[derive(Default)]
struct JsonLoader {
    ids: FxHashMap<String, ObjectId>,
    pending: Vec<PendingRef>,
}

impl JsonLoader {
    fn object(&mut self, data: &mut ModelData, json: &Json, container: Option<ObjectId>) -> Result<ObjectId, ModelError> {
        let Json::Object(map) = json else {
            return Err(invalid(format!("expected an object, got {json}")));
        };
        let type_name = map
            .get(TYPE_KEY)
            .and_then(Json::as_str)
            .ok_or_else(|| invalid("object without a 'type'"))?;
        let id = data.create(type_name, container);
        if let Some(key) = map.get(ID_KEY).and_then(Json::as_str) {
            if self.ids.insert(key.to_string(), id).is_some() {
                return Err(invalid(format!("duplicate $id '{key}'")));
            }
        }

        for (feature, json) in map {
            if feature == TYPE_KEY || feature == ID_KEY {
                continue;
            }
            let value = match json {
                Json::Array(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items.iter().filter(|item| !item.is_null()) {
                        let index = list.len();
                        list.push(ValueNode::new(self.feature(data, id, feature, Some(index), item)?));
                    }
                    Value::List(list)
                }
                single => self.feature(data, id, feature, None, single)?,
            };
            data.object_mut(id)?.features.push((feature.clone(), value));
        }
        Ok(id)
    }

    fn feature(
        &mut self,
        data: &mut ModelData,
        owner: ObjectId,
        feature: &str,
        index: Option<usize>,
        json: &Json,
    ) -> Result<Value, ModelError> {
        Ok(match json {
            Json::Null => Value::Absent,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Text(s.clone()),
            Json::Object(map) => {
                if let Some(target) = map.get(REF_KEY).and_then(Json::as_str) {
                    self.pending.push(PendingRef {
                        node: owner,
                        feature: feature.to_string(),
                        index,
                        target: target.to_string(),
                    });
                    Value::Absent
                } else {
                    let child = self.object(data, json, Some(owner))?;
                    data.object_mut(owner)?.containments.insert(feature.to_string());
                    Value::Node(child)
                }
            }
            Json::Array(_) => return Err(invalid(format!("nested list in feature '{feature}'"))),
        })
    }

    fn resolve(&mut self, data: &mut ModelData) -> Result<(), ModelError> {
        for pending in self.pending.drain(..) {
            let target = *self
                .ids
                .get(&pending.target)
                .ok_or_else(|| ModelError::UnresolvedReference(pending.target.clone()))?;
            let object = data.object_mut(pending.node)?;
            let slot = object.slot(&pending.feature);
            match (slot, pending.index) {
                (Value::List(items), Some(index)) if index < items.len() => {
                    items[index] = ValueNode::new(Value::Node(target));
                }
                (slot, None) => *slot = Value::Node(target),
                _ => return Err(invalid(format!("misplaced reference '{}'", pending.target))),
            }
        }
        Ok(())
    }
}

impl Model for MemoryModel {
    fn type_name(&self, node: ObjectId) -> Option<String> {
        self.data.read().object(node).ok().map(|o| o.type_name.clone())
    }

    fn is_instance_of(&self, node: ObjectId, type_name: &str) -> bool {
        let data = self.data.read();
        match data.object(node) {
            Ok(object) => data.lineage(&object.type_name).iter().any(|t| t == type_name),
            Err(_) => false,
        }
    }

    fn feature_value(&self, node: ObjectId, feature: &str) -> Option<Value> {
        let data = self.data.read();
        let object = data.object(node).ok()?;
        match object.get(feature) {
            Some(value) => Some(value.clone()),
            None => data
                .declared_feature(&object.type_name, feature)
                .map(|_| Value::Absent),
        }
    }

    fn set_feature_value(&self, node: ObjectId, feature: &str, value: Value) -> Result<(), ModelError> {
        let mut data = self.data.write();
        *data.object_mut(node)?.slot(feature) = value;
        Ok(())
    }

    fn add_to_feature(&self, node: ObjectId, feature: &str, value: Value) -> Result<(), ModelError> {
        let mut data = self.data.write();
        push_element(data.object_mut(node)?.slot(feature), value);
        Ok(())
    }

    fn remove_from_feature(&self, node: ObjectId, feature: &str, value: &Value) -> Result<(), ModelError> {
        let mut data = self.data.write();
        let slot = data.object_mut(node)?.slot(feature);
        match slot {
            Value::List(items) => items.retain(|item| &item.value != value),
            single if &*single == value => *single = Value::Absent,
            _ => {}
        }
        Ok(())
    }

    fn children(&self, node: ObjectId) -> Vec<ObjectId> {
        let data = self.data.read();
        let Ok(object) = data.object(node) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (feature, value) in &object.features {
            if !object.containments.contains(feature) {
                continue;
            }
            match value {
                Value::Node(id) => out.push(*id),
                Value::List(items) => out.extend(items.iter().filter_map(|item| match item.value {
                    Value::Node(id) => Some(id),
                    _ => None,
                })),
                _ => {}
            }
        }
        out
    }

    fn container(&self, node: ObjectId) -> Option<ObjectId> {
        self.data.read().object(node).ok().and_then(|o| o.container)
    }

    fn is_containment(&self, node: ObjectId, feature: &str) -> bool {
        self.data
            .read()
            .object(node)
            .map(|o| o.containments.contains(feature))
            .unwrap_or(false)
    }

    fn label(&self, node: ObjectId) -> String {
        let data = self.data.read();
        match data.object(node) {
            Ok(object) => match object.get(LABEL_FEATURE) {
                Some(Value::Text(name)) => name.clone(),
                _ => format!("{}{node}", object.type_name),
            },
            Err(_) => node.to_string(),
        }
    }

    fn roots(&self) -> Vec<ObjectId> {
        self.data.read().roots.clone()
    }

    fn feature_type(&self, type_name: &str, feature: &str) -> Option<TypeRef> {
        self.data.read().declared_feature(type_name, feature)
    }
}
