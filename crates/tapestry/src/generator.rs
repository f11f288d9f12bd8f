//! Writes the files declared by templates carrying a `file(...)` attribute.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tapestry_ast::TemplateDef;
use tracing::{debug, warn};

use crate::context::EvalContext;
use crate::error::{EvalError, Result, TapestryError};
use crate::evaluator::{Evaluator, Mode};
use crate::loader::Module;
use crate::merge::Merge;
use crate::model::{all_nodes, ObjectId};
use crate::resource::Resources;
use crate::settings::Settings;
use crate::value::{Diagnostic, ValueNode};

/// One written file.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub path: String,
    pub template: String,
    pub diagnostics: Vec<Diagnostic>,
    /// User code that no longer had a place in the file, appended to the
    /// lost-code file next to it.
    pub lost_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub files: Vec<GeneratedFile>,
    /// Failures that prevented a file from being written at all.
    pub failures: Vec<Diagnostic>,
}

impl GenerationReport {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.failures
            .iter()
            .chain(self.files.iter().flat_map(|file| file.diagnostics.iter()))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics().any(Diagnostic::is_error)
    }
}

pub struct Generator<'a> {
    evaluator: &'a Evaluator<'a>,
    resources: &'a dyn Resources,
    merge: &'a dyn Merge,
    settings: &'a Settings,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Generator<'a> {
    pub fn new(
        evaluator: &'a Evaluator<'a>,
        resources: &'a dyn Resources,
        merge: &'a dyn Merge,
        settings: &'a Settings,
    ) -> Self {
        Self {
            evaluator,
            resources,
            merge,
            settings,
            cancel: None,
        }
    }

    /// Checked before each file.
    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run every file template of `module` for each model node it accepts,
    /// in declaration order, nodes depth-first from the model roots.
    pub fn generate(&self, module: &Arc<Module>) -> Result<GenerationReport> {
        let model = self.evaluator.model();
        let nodes = all_nodes(model);
        let mut report = GenerationReport::default();

        for template in module.script.file_templates() {
            let matching = nodes
                .iter()
                .copied()
                .filter(|node| template.accepts_any() || model.is_instance_of(*node, &template.type_name));
            for node in matching {
                if self.cancel.is_some_and(|cancel| cancel.load(Ordering::Relaxed)) {
                    return Err(EvalError::Canceled.into());
                }
                match self.generate_file(module, template, node)? {
                    Ok(file) => report.files.push(file),
                    Err(failure) => report.failures.push(failure),
                }
            }
        }
        debug!(
            module = %module.name,
            files = report.files.len(),
            failures = report.failures.len(),
            "generation finished"
        );
        Ok(report)
    }

    /// The inner error is a failure that skips this file only.
    fn generate_file(
        &self,
        module: &Arc<Module>,
        template: &TemplateDef,
        node: ObjectId,
    ) -> Result<std::result::Result<GeneratedFile, Diagnostic>> {
        let Some(file) = &template.file else {
            return Ok(Err(Diagnostic::warning("template has no file", template.span)));
        };
        let receiver = ValueNode::new(node.into());
        let mut ctx = EvalContext::for_module(Arc::clone(module));
        let located = |error: EvalError| Diagnostic::from_error(error).located(&module.path, module.source());

        let path = match self.evaluator.expression(file, &receiver, &mut ctx, Mode::Recursive) {
            Ok(path) => path,
            Err(error) if error.is_blocking() => return Err(error.into()),
            Err(error) => return Ok(Err(located(error))),
        };
        let mut diagnostics = path.log.clone();
        let path = path.value.render(self.evaluator.model());
        if path.trim().is_empty() {
            let error = EvalError::evaluation(format!("file path of '{}' is empty", template.name), file.span);
            return Ok(Err(located(error)));
        }

        let body = match self
            .evaluator
            .invoke_template(Arc::clone(module), template, receiver, Vec::new(), template.span, &mut ctx)
        {
            Ok(body) => body,
            Err(error) if error.is_blocking() => return Err(error.into()),
            Err(error) => return Ok(Err(located(error))),
        };
        diagnostics.extend(body.log.iter().cloned());
        let text = body.value.render(self.evaluator.model());

        let lost_code = self.write(&path, text)?;
        debug!(path = %path, template = %template.name, "generated file");
        Ok(Ok(GeneratedFile {
            path,
            template: template.name.clone(),
            diagnostics,
            lost_code,
        }))
    }

    /// Write `text` to `path`, merging with the user code already there.
    fn write(&self, path: &str, text: String) -> Result<Option<String>> {
        if !self.resources.exists(path) {
            self.resources.write(path, &text)?;
            return Ok(None);
        }
        let old = self.resources.read(path)?;
        let merged = self
            .merge
            .merge(
                path,
                &text,
                &old,
                &self.settings.user_code_begin,
                &self.settings.user_code_end,
            )
            .map_err(|e| TapestryError::Merge {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        self.resources.write(path, &merged.text)?;
        if merged.lost.is_empty() {
            return Ok(None);
        }
        let lost_path = format!("{path}{}", self.settings.lost_suffix);
        warn!(path, lost = %lost_path, "user code lost while merging");
        self.resources.append(&lost_path, &merged.lost)?;
        Ok(Some(merged.lost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::UserCodeMerge;
    use crate::model::MemoryModel;
    use crate::resource::MemoryResources;
    use crate::scope::Scopes;
    use pretty_assertions::assert_eq;
    use tapestry_ast::parse_script;

    const SCRIPT: &str = r#"[template class(Entity) file(name + ".java")]
class [name/] {
[startUserCode/] body
[endUserCode/]
}
[/template]"#;

    fn module() -> Arc<Module> {
        let script = parse_script("java", SCRIPT).unwrap();
        Arc::new(Module::new("java", "java.tpl", script, None, vec![]))
    }

    fn model() -> MemoryModel {
        MemoryModel::from_json_str(
            r#"[{ "type": "Entity", "name": "User" }, { "type": "Other", "name": "Skip" }, { "type": "Entity", "name": "Order" }]"#,
        )
        .unwrap()
    }

    #[test]
    fn writes_one_file_per_matching_node() {
        let model = model();
        let (scopes, settings) = (Scopes::standard(), Settings::default());
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let resources = MemoryResources::new();
        let generator = Generator::new(&evaluator, &resources, &UserCodeMerge, &settings);

        let report = generator.generate(&module()).unwrap();
        let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["User.java", "Order.java"]);
        assert!(!report.has_errors());
        let files = resources.files();
        assert!(files["User.java"].starts_with("class User {\n"));
    }

    #[test]
    fn user_code_survives_regeneration() {
        let model = model();
        let (scopes, settings) = (Scopes::standard(), Settings::default());
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let edited = format!(
            "class User {{\n{} body\nkept();\n{}\n}}",
            settings.user_code_begin, settings.user_code_end
        );
        let resources = MemoryResources::new().with_file("User.java", &edited);
        let generator = Generator::new(&evaluator, &resources, &UserCodeMerge, &settings);

        let report = generator.generate(&module()).unwrap();
        assert!(report.files.iter().all(|f| f.lost_code.is_none()));
        assert_eq!(resources.files()["User.java"], edited);
    }

    #[test]
    fn canceled_generation_stops() {
        let model = model();
        let (scopes, settings) = (Scopes::standard(), Settings::default());
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let resources = MemoryResources::new();
        let cancel = AtomicBool::new(true);
        let generator = Generator::new(&evaluator, &resources, &UserCodeMerge, &settings).with_cancel_flag(&cancel);
        assert!(matches!(
            generator.generate(&module()),
            Err(TapestryError::Eval(EvalError::Canceled))
        ));
        assert!(resources.files().is_empty());
    }
}
