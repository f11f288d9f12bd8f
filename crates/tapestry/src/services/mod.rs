//! Built-in services and the registry they are declared in.
//!
//! A service is looked up by name and arity. Its receiver and every
//! parameter declare an ordered list of accepted types; the first type a
//! value coerces to is the one the service sees. A service whose receiver
//! or arguments do not coerce is skipped, as if it did not exist.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::coerce::coerce_any;
use crate::context::EvalContext;
use crate::error::CoercionError;
use crate::model::{Model, ModelError, ObjectId};
use crate::scope::Rank;
use crate::settings::Settings;
use crate::value::{TypeRef, Value, ValueNode, ValueType};

mod context;
mod list;
mod meta;
mod text;

pub use context::context_services;
pub use list::list_services;
pub use meta::meta_services;
pub use text::text_services;

pub const ANY: &[ValueType] = &[ValueType::Any];
/// Any receiver, absent included.
pub const ANYTHING: &[ValueType] = &[ValueType::Any, ValueType::Absent];
pub const BOOL: &[ValueType] = &[ValueType::Bool];
pub const INT: &[ValueType] = &[ValueType::Int];
pub const TEXT: &[ValueType] = &[ValueType::Text];
pub const NODE: &[ValueType] = &[ValueType::Node];
pub const LIST: &[ValueType] = &[ValueType::List];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    pub fn failed(message: impl Into<String>) -> Self {
        ServiceError::Failed(message.into())
    }
}

pub type ServiceFn = fn(&mut Invocation<'_>) -> Result<Value, ServiceError>;

/// Static result type of a service.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    Fixed(TypeRef),
    /// Same type as the receiver.
    Receiver,
    /// Element type of a list receiver.
    Element,
    Any,
}

impl Returns {
    fn resolve(&self, receiver: &TypeRef) -> TypeRef {
        match self {
            Returns::Fixed(ty) => ty.clone(),
            Returns::Receiver => receiver.clone(),
            Returns::Element => receiver.element().cloned().unwrap_or(TypeRef::Any),
            Returns::Any => TypeRef::Any,
        }
    }
}

/// One registered service.
#[derive(Clone)]
pub struct Service {
    pub name: &'static str,
    pub receiver: &'static [ValueType],
    pub params: &'static [&'static [ValueType]],
    pub returns: Returns,
    func: ServiceFn,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("arity", &self.params.len())
            .finish()
    }
}

impl Service {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Can a receiver of static type `receiver` be passed to this service?
    fn accepts_type(&self, receiver: &TypeRef) -> bool {
        let wanted = receiver.value_type();
        wanted == ValueType::Any
            || self
                .receiver
                .iter()
                .any(|ty| *ty == ValueType::Any || *ty == wanted)
    }
}

/// Arguments of one service call, already coerced to the declared types.
pub struct Invocation<'a> {
    pub receiver: ValueNode,
    pub args: Vec<ValueNode>,
    pub model: &'a dyn Model,
    pub settings: &'a Settings,
    pub context: &'a mut EvalContext,
}

impl Invocation<'_> {
    pub fn receiver_text(&self) -> Result<&str, ServiceError> {
        expect_text(&self.receiver.value)
    }

    pub fn receiver_list(&self) -> Result<&[ValueNode], ServiceError> {
        match &self.receiver.value {
            Value::List(items) => Ok(items),
            other => Err(mismatch(other, ValueType::List)),
        }
    }

    pub fn receiver_node(&self) -> Result<ObjectId, ServiceError> {
        match &self.receiver.value {
            Value::Node(id) => Ok(*id),
            other => Err(mismatch(other, ValueType::Node)),
        }
    }

    pub fn arg_node(&self, index: usize) -> Result<&ValueNode, ServiceError> {
        self.args
            .get(index)
            .ok_or_else(|| ServiceError::failed(format!("missing argument {index}")))
    }

    pub fn arg(&self, index: usize) -> Result<&Value, ServiceError> {
        self.arg_node(index).map(|node| &node.value)
    }

    pub fn text(&self, index: usize) -> Result<&str, ServiceError> {
        expect_text(self.arg(index)?)
    }

    pub fn int(&self, index: usize) -> Result<i64, ServiceError> {
        match self.arg(index)? {
            Value::Int(n) => Ok(*n),
            other => Err(mismatch(other, ValueType::Int)),
        }
    }
}

fn expect_text(value: &Value) -> Result<&str, ServiceError> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(mismatch(other, ValueType::Text)),
    }
}

fn mismatch(value: &Value, to: ValueType) -> ServiceError {
    ServiceError::Coercion(CoercionError::Convert {
        from: value.type_name(),
        to: to.name(),
    })
}

/// Character index `index` of `text` as a byte offset, `None` when out of
/// range. The end of the text is a valid index.
pub(crate) fn char_offset(text: &str, index: i64) -> Option<usize> {
    let index = usize::try_from(index).ok()?;
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

// ============================================================================
// Collections
// ============================================================================

/// A named group of services sharing a rank and a prefix gate.
#[derive(Debug, Clone)]
pub struct ServiceCollection {
    name: String,
    rank: Rank,
    prefix: Option<String>,
    list_capable: bool,
    services: FxHashMap<&'static str, Vec<Service>>,
}

impl ServiceCollection {
    pub fn new(name: impl Into<String>, rank: Rank) -> Self {
        Self {
            name: name.into(),
            rank,
            prefix: None,
            list_capable: false,
            services: FxHashMap::default(),
        }
    }

    /// Only calls written `prefix::name` reach this collection.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Services of this collection receive lists whole instead of being
    /// mapped over their elements.
    pub fn list_capable(mut self) -> Self {
        self.list_capable = true;
        self
    }

    /// Register a service. Overloads of the same name and arity are tried
    /// in registration order.
    pub fn add(
        mut self,
        name: &'static str,
        receiver: &'static [ValueType],
        params: &'static [&'static [ValueType]],
        returns: Returns,
        func: ServiceFn,
    ) -> Self {
        self.services.entry(name).or_default().push(Service {
            name,
            receiver,
            params,
            returns,
            func,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn is_list_capable(&self) -> bool {
        self.list_capable
    }

    pub fn accepts_prefix(&self, prefix: Option<&str>) -> bool {
        self.prefix.as_deref() == prefix
    }

    pub fn contains(&self, name: &str, arity: usize) -> bool {
        self.overloads(name, arity).next().is_some()
    }

    fn overloads<'a>(&'a self, name: &str, arity: usize) -> impl Iterator<Item = &'a Service> + 'a {
        self.services
            .get(name)
            .into_iter()
            .flatten()
            .filter(move |service| service.arity() == arity)
    }

    /// Call the first overload the receiver and arguments coerce to.
    /// `None` when there is no such service.
    pub fn invoke(
        &self,
        name: &str,
        receiver: &ValueNode,
        args: &[ValueNode],
        model: &dyn Model,
        settings: &Settings,
        context: &mut EvalContext,
    ) -> Option<Result<Value, ServiceError>> {
        for service in self.overloads(name, args.len()) {
            if receiver.is_absent() && !service.receiver.contains(&ValueType::Absent) {
                continue;
            }
            let Ok(coerced_receiver) = coerce_any(receiver, service.receiver, model) else {
                continue;
            };
            let coerced_args: Option<Vec<ValueNode>> = args
                .iter()
                .zip(service.params)
                .map(|(arg, accepted)| coerce_any(arg, accepted, model).ok())
                .collect();
            let Some(coerced_args) = coerced_args else {
                continue;
            };
            let mut invocation = Invocation {
                receiver: coerced_receiver,
                args: coerced_args,
                model,
                settings,
                context: &mut *context,
            };
            return Some((service.func)(&mut invocation));
        }
        None
    }

    /// Result type of `name` applied to a receiver of type `receiver`.
    pub fn next_type(&self, receiver: &TypeRef, name: &str, arity: usize) -> Option<TypeRef> {
        self.overloads(name, arity)
            .find(|service| service.accepts_type(receiver))
            .map(|service| service.returns.resolve(receiver))
    }
}
