//! Script loading for `import` and `extends` directives.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tapestry_ast::{parse_script, ParentTable, Script, TemplateDef};
use tracing::debug;

use crate::error::{Result, TapestryError};
use crate::model::Model;
use crate::resource::{join, parent_dir, Resources};
use crate::settings::Settings;
use crate::value::Value;

/// A loaded script together with the scripts it depends on.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    /// Resource path the script was read from.
    pub path: String,
    pub script: Script,
    /// Script named by `extends`.
    pub parent: Option<Arc<Module>>,
    pub imports: Vec<Arc<Module>>,
    file: Arc<str>,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        script: Script,
        parent: Option<Arc<Module>>,
        imports: Vec<Arc<Module>>,
    ) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            file: Arc::from(path.as_str()),
            path,
            script,
            parent,
            imports,
        }
    }

    /// Module without templates standing for a standalone template source,
    /// so diagnostics can point into it.
    pub fn inline(name: &str, source: &str) -> Self {
        let script = Script {
            name: name.to_string(),
            source: source.to_string(),
            imports: Vec::new(),
            extends: None,
            templates: Vec::new(),
            parents: ParentTable::new(),
        };
        Self::new(name, name, script, None, Vec::new())
    }

    pub fn source(&self) -> &str {
        &self.script.source
    }

    /// Path shared with the provenance of generated text.
    pub fn file(&self) -> Arc<str> {
        Arc::clone(&self.file)
    }

    /// This module, then the modules it extends, nearest first.
    pub fn lineage(self: &Arc<Self>) -> impl Iterator<Item = &Arc<Module>> {
        std::iter::successors(Some(self), |module| module.parent.as_ref())
    }

    /// First template called `name` accepting `receiver`, searching this
    /// module before the ones it extends. A prefix restricts the search to
    /// the module of that name.
    pub fn find_template<'a>(
        self: &'a Arc<Self>,
        prefix: Option<&str>,
        name: &str,
        receiver: &Value,
        model: &dyn Model,
    ) -> Option<(&'a Arc<Module>, &'a TemplateDef)> {
        self.lineage()
            .filter(|module| module.answers_to(prefix))
            .find_map(|module| {
                module
                    .script
                    .templates_named(name)
                    .find(|template| accepts(template, receiver, model))
                    .map(|template| (module, template))
            })
    }

    /// Is `prefix` a valid qualifier for templates of this module?
    pub fn answers_to(&self, prefix: Option<&str>) -> bool {
        prefix.map_or(true, |prefix| prefix == self.name)
    }
}

fn accepts(template: &TemplateDef, receiver: &Value, model: &dyn Model) -> bool {
    if template.accepts_any() {
        return true;
    }
    match receiver {
        Value::Node(id) => model.is_instance_of(*id, &template.type_name),
        _ => false,
    }
}

/// Reject names that could leave the script directory.
fn validate_script_name(name: &str) -> Result<()> {
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(TapestryError::Load {
            message: format!("invalid script name (path traversal): {name}"),
        });
    }
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TapestryError::Load {
            message: format!("invalid script name '{name}'"),
        })
    }
}

/// Name of the script stored at `path`: its file name without extension.
fn script_name(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem)
}

/// Loads scripts and their dependencies, each once.
pub struct ScriptLoader {
    resources: Arc<dyn Resources>,
    extension: String,
    cache: FxHashMap<String, Arc<Module>>,
    loading: Vec<String>,
}

impl ScriptLoader {
    pub fn new(resources: Arc<dyn Resources>, settings: &Settings) -> Self {
        Self {
            resources,
            extension: settings.script_extension.clone(),
            cache: FxHashMap::default(),
            loading: Vec::new(),
        }
    }

    /// Load the script at `path` with everything it imports or extends.
    pub fn load(&mut self, path: &str) -> Result<Arc<Module>> {
        if let Some(module) = self.cache.get(path) {
            return Ok(Arc::clone(module));
        }
        if let Some(start) = self.loading.iter().position(|loading| loading == path) {
            let mut chain = self.loading[start..].to_vec();
            chain.push(path.to_string());
            return Err(TapestryError::Load {
                message: format!("circular script dependency: {}", chain.join(" -> ")),
            });
        }

        self.loading.push(path.to_string());
        let result = self.load_uncached(path);
        self.loading.pop();

        let module = Arc::new(result?);
        self.cache.insert(path.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Path of the script `name` next to `requester`.
    pub fn resolve(&self, requester: &str, name: &str) -> Result<String> {
        validate_script_name(name)?;
        let wanted = join(parent_dir(requester), &format!("{name}.{}", self.extension));
        let siblings = self.resources.siblings(requester).map_err(|e| TapestryError::Load {
            message: format!("cannot list scripts next to '{requester}': {e}"),
        })?;
        siblings
            .into_iter()
            .find(|sibling| *sibling == wanted)
            .ok_or_else(|| TapestryError::Load {
                message: format!("script '{name}' not found next to '{requester}'"),
            })
    }

    fn load_uncached(&mut self, path: &str) -> Result<Module> {
        let source = self.resources.read(path).map_err(|e| TapestryError::Load {
            message: format!("cannot read script '{path}': {e}"),
        })?;
        let name = script_name(path);
        let script = parse_script(name, &source).map_err(|source| TapestryError::Parse {
            script: path.to_string(),
            source,
        })?;

        let parent = match &script.extends {
            Some(directive) => Some(self.load_dependency(path, &directive.name)?),
            None => None,
        };
        let imports = script
            .imports
            .iter()
            .map(|directive| self.load_dependency(path, &directive.name))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            path,
            templates = script.templates.len(),
            imports = imports.len(),
            extends = parent.is_some(),
            "loaded script"
        );
        Ok(Module::new(name, path, script, parent, imports))
    }

    fn load_dependency(&mut self, requester: &str, name: &str) -> Result<Arc<Module>> {
        let path = self.resolve(requester, name)?;
        self.load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;
    use crate::resource::MemoryResources;
    use pretty_assertions::assert_eq;

    fn loader(resources: MemoryResources) -> ScriptLoader {
        ScriptLoader::new(Arc::new(resources), &Settings::default())
    }

    #[test]
    fn validates_names() {
        assert!(validate_script_name("common").is_ok());
        assert!(validate_script_name("java-common.v2").is_ok());
        assert!(validate_script_name("../escape").is_err());
        assert!(validate_script_name("dir/file").is_err());
        assert!(validate_script_name("c:file").is_err());
        assert!(validate_script_name("").is_err());
        assert!(validate_script_name("-x").is_err());
    }

    #[test]
    fn script_names() {
        assert_eq!(script_name("gen/main.tpl"), "main");
        assert_eq!(script_name("main"), "main");
        assert_eq!(script_name("a/b.c.tpl"), "b.c");
    }

    #[test]
    fn loads_dependencies_once() {
        let mut loader = loader(
            MemoryResources::new()
                .with_file("gen/main.tpl", "[extends base/]\n[import util/]\n[template t(*)]x[/template]")
                .with_file("gen/base.tpl", "[import util/]\n[template b(*)]b[/template]")
                .with_file("gen/util.tpl", "[template u(*)]u[/template]"),
        );
        let main = loader.load("gen/main.tpl").unwrap();
        assert_eq!(main.name, "main");
        let base = main.parent.as_ref().unwrap();
        assert_eq!(base.path, "gen/base.tpl");
        assert!(Arc::ptr_eq(&main.imports[0], &base.imports[0]));
        let names: Vec<&str> = main.lineage().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["main", "base"]);
    }

    #[test]
    fn circular_dependencies_fail() {
        let mut loader = loader(
            MemoryResources::new()
                .with_file("a.tpl", "[import b/]")
                .with_file("b.tpl", "[extends a/]"),
        );
        let error = loader.load("a.tpl").unwrap_err();
        assert_eq!(
            error.to_string(),
            "load error: circular script dependency: a.tpl -> b.tpl -> a.tpl"
        );
    }

    #[test]
    fn missing_and_malformed_scripts() {
        let mut loader = loader(
            MemoryResources::new()
                .with_file("a.tpl", "[import missing/]")
                .with_file("b.tpl", "[template t(*)]unclosed"),
        );
        assert!(matches!(loader.load("a.tpl"), Err(TapestryError::Load { .. })));
        assert!(matches!(loader.load("b.tpl"), Err(TapestryError::Parse { .. })));
    }

    #[test]
    fn templates_are_found_by_type_then_in_parents() {
        let model = MemoryModel::new();
        model.declare_type("Entity", &["Named"]);
        let entity = model.create_root("Entity");
        let other = model.create_root("Other");
        let mut loader = loader(
            MemoryResources::new()
                .with_file(
                    "main.tpl",
                    "[extends base/]\n[template name(Named)]child[/template]",
                )
                .with_file(
                    "base.tpl",
                    "[template name(Other)]other[/template]\n[template name(*)]any[/template]",
                ),
        );
        let main = loader.load("main.tpl").unwrap();
        let found = |receiver: Value| {
            main.find_template(None, "name", &receiver, &model)
                .map(|(module, _)| module.name.clone())
        };
        assert_eq!(found(Value::Node(entity)), Some("main".to_string()));
        assert_eq!(found(Value::Node(other)), Some("base".to_string()));
        assert_eq!(found(Value::from("text")), Some("base".to_string()));
        assert!(main.find_template(None, "missing", &Value::Node(entity), &model).is_none());
        let qualified = main
            .find_template(Some("base"), "name", &Value::Node(entity), &model)
            .map(|(module, _)| module.name.as_str());
        assert_eq!(qualified, Some("base"));
    }
}
