//! Integration tests for scripts: loading with `extends` and `import`,
//! template calls and file generation with user code preservation.
//!
//! Scripts come from tests/fixtures/scripts/ and are copied into a
//! temporary directory that also receives the generated files.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tapestry::{FsResources, MemoryModel, Model, Tapestry, TapestryError, Value};
use tempfile::TempDir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("scripts")
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(fixtures_dir()).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }
    dir
}

fn session(dir: &Path) -> Tapestry {
    Tapestry::new(Arc::new(FsResources::new(dir).unwrap()))
}

fn model() -> MemoryModel {
    MemoryModel::from_json(&json!([{
        "type": "Entity",
        "name": "User",
        "attributes": [
            { "type": "Attribute", "name": "id", "kind": "long" },
            { "type": "Attribute", "name": "email", "kind": "string" }
        ]
    }]))
    .unwrap()
}

fn user(model: &MemoryModel) -> Value {
    Value::Node(model.roots()[0])
}

const GENERATED: &str = r#"// User generated
public class User {
    Long id; // "id"
    String email; // "email"
    // Start of user code methods
    // End of user code
}"#;

// ============================================================================
// Generation
// ============================================================================

#[test]
fn generates_files_from_extended_and_imported_templates() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let model = model();

    let report = tapestry.generate(&module, &model).unwrap();

    assert!(!report.has_errors(), "{:?}", report.diagnostics().collect::<Vec<_>>());
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, "src/User.java");
    assert_eq!(report.files[0].template, "class");
    let written = fs::read_to_string(dir.path().join("src/User.java")).unwrap();
    assert_eq!(written, GENERATED);
}

#[test]
fn regeneration_keeps_user_code_and_saves_the_rest() {
    let dir = workspace();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    let edited = r#"// User generated
public class User {
    Long id; // "id"
    // Start of user code methods
    void greet() {}
    // End of user code
    // Start of user code helpers
    int legacy;
    // End of user code
}"#;
    fs::write(dir.path().join("src/User.java"), edited).unwrap();

    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let report = tapestry.generate(&module, &model()).unwrap();

    let written = fs::read_to_string(dir.path().join("src/User.java")).unwrap();
    assert_eq!(
        written,
        GENERATED.replace(
            "methods\n    // End",
            "methods\n    void greet() {}\n    // End"
        )
    );
    let lost = fs::read_to_string(dir.path().join("src/User.java.lost")).unwrap();
    assert_eq!(lost, "// Start of user code helpers\n    int legacy;\n// End of user code\n");
    assert_eq!(report.files[0].lost_code.as_deref(), Some(lost.as_str()));
}

#[test]
fn regenerating_twice_is_stable() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let model = model();

    tapestry.generate(&module, &model).unwrap();
    let report = tapestry.generate(&module, &model).unwrap();

    assert!(report.files[0].lost_code.is_none());
    let written = fs::read_to_string(dir.path().join("src/User.java")).unwrap();
    assert_eq!(written, GENERATED);
    assert!(!dir.path().join("src/User.java.lost").exists());
}

// ============================================================================
// Template calls
// ============================================================================

#[test]
fn templates_shadow_services_but_not_prefixed_calls() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let model = model();

    let output = tapestry
        .call(&module, "describe", &model, user(&model), vec![])
        .unwrap();
    assert_eq!(output.text, "templated|Entity|id,email");
}

#[test]
fn template_arguments_and_post() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let model = MemoryModel::new();

    let greeting = tapestry
        .call(&module, "greet", &model, Value::from("x"), vec![Value::from("Ada")])
        .unwrap();
    assert_eq!(greeting.text, "Hello Ada");

    let shout = tapestry.call(&module, "shout", &model, Value::from("hey"), vec![]).unwrap();
    assert_eq!(shout.text, "HEY!");
}

#[test]
fn calling_an_unknown_template_fails() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let module = tapestry.load("java.tpl").unwrap();
    let model = model();

    let result = tapestry.call(&module, "header", &model, Value::from("text"), vec![]);
    assert!(matches!(result, Err(TapestryError::Eval(_))));
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn loading_is_cached() {
    let dir = workspace();
    let mut tapestry = session(dir.path());
    let first = tapestry.load("java.tpl").unwrap();
    let second = tapestry.load("java.tpl").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.parent.as_ref().map(|p| p.name.as_str()), Some("base"));
    assert_eq!(first.imports[0].name, "common");
}

#[test]
fn missing_dependency_fails() {
    let dir = workspace();
    fs::write(dir.path().join("broken.tpl"), "[import nowhere/]\n").unwrap();
    let mut tapestry = session(dir.path());
    let result = tapestry.load("broken.tpl");
    assert!(matches!(result, Err(TapestryError::Load { .. })));
}

#[test]
fn circular_extends_fails() {
    let dir = workspace();
    fs::write(dir.path().join("a.tpl"), "[extends b/]\n").unwrap();
    fs::write(dir.path().join("b.tpl"), "[extends a/]\n").unwrap();
    let mut tapestry = session(dir.path());
    match tapestry.load("a.tpl") {
        Err(TapestryError::Load { message }) => assert!(message.contains("circular"), "{message}"),
        other => panic!("expected a load error, got {other:?}"),
    }
}

#[test]
fn script_parse_errors_name_the_script() {
    let dir = workspace();
    fs::write(dir.path().join("bad.tpl"), "[template t(*)]never closed").unwrap();
    let mut tapestry = session(dir.path());
    match tapestry.load("bad.tpl") {
        Err(TapestryError::Parse { script, .. }) => assert_eq!(script, "bad.tpl"),
        other => panic!("expected a parse error, got {other:?}"),
    }
}
