//! Sources a call can be resolved against, in priority order.

use crate::services::{
    context_services, list_services, meta_services, text_services, ServiceCollection,
};

/// Scopes ranked `Specific` are consulted before `Default` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Specific,
    Default,
}

#[derive(Debug, Clone)]
pub enum Scope {
    Services(ServiceCollection),
    /// Features of the current model node.
    Features,
    /// Templates of the scripts imported by the running script.
    Imports,
}

impl Scope {
    pub fn name(&self) -> &str {
        match self {
            Scope::Services(services) => services.name(),
            Scope::Features => "features",
            Scope::Imports => "imports",
        }
    }

    pub fn rank(&self) -> Rank {
        match self {
            Scope::Services(services) => services.rank(),
            Scope::Features => Rank::Specific,
            Scope::Imports => Rank::Default,
        }
    }

    /// Receives list values whole; other scopes are mapped over the
    /// elements of a list.
    pub fn is_list_capable(&self) -> bool {
        matches!(self, Scope::Services(services) if services.is_list_capable())
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Scope::Services(_))
    }
}

/// Ordered scope list of a session.
#[derive(Debug, Clone)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::standard()
    }
}

impl Scopes {
    /// Built-in services, model features and imported scripts.
    pub fn standard() -> Self {
        let mut scopes = Self { scopes: Vec::new() };
        scopes.push(Scope::Services(list_services()));
        scopes.push(Scope::Services(context_services()));
        scopes.push(Scope::Features);
        scopes.push(Scope::Imports);
        scopes.push(Scope::Services(text_services()));
        scopes.push(Scope::Services(meta_services()));
        scopes
    }

    /// Add a scope after the others of its rank.
    pub fn push(&mut self, scope: Scope) {
        let at = self
            .scopes
            .iter()
            .position(|existing| existing.rank() > scope.rank())
            .unwrap_or(self.scopes.len());
        self.scopes.insert(at, scope);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// Service collections only, in priority order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceCollection> {
        self.scopes.iter().filter_map(|scope| match scope {
            Scope::Services(services) => Some(services),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn specific_scopes_come_first() {
        let mut scopes = Scopes::standard();
        scopes.push(Scope::Services(ServiceCollection::new("late", Rank::Default)));
        scopes.push(Scope::Services(ServiceCollection::new("early", Rank::Specific)));
        let names: Vec<&str> = scopes.iter().map(Scope::name).collect();
        assert_eq!(
            names,
            vec!["list", "features", "early", "context", "imports", "text", "meta", "late"]
        );
    }

    #[test]
    fn list_capability() {
        let scopes = Scopes::standard();
        let capable: Vec<&str> = scopes
            .iter()
            .filter(|scope| scope.is_list_capable())
            .map(Scope::name)
            .collect();
        assert_eq!(capable, vec!["list", "context"]);
    }
}
