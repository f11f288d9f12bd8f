//! Integration tests driven by the case files in tests/cases/*.json

use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tapestry::{render, EvalError, TapestryError};

#[derive(Debug, Deserialize)]
struct TestSuite {
    description: String,
    tests: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    name: String,
    template: String,
    data: serde_json::Value,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

fn load_test_suite(filename: &str) -> TestSuite {
    let path = cases_dir().join(filename);
    let content = fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse {filename}: {e}"))
}

fn run_test_case(case: &TestCase) {
    let result = render(&case.template, case.data.clone());

    if let Some(expected) = &case.expected {
        match result {
            Ok(output) => assert_eq!(&output, expected, "Test '{}' failed", case.name),
            Err(e) => panic!(
                "Test '{}' should succeed with '{}', but got error: {:?}",
                case.name, expected, e
            ),
        }
    } else if let Some(error_type) = &case.error {
        match result {
            Ok(output) => panic!(
                "Test '{}' should fail with {}, but succeeded with '{}'",
                case.name, error_type, output
            ),
            Err(e) => assert!(
                error_type_matches(&e, error_type),
                "Test '{}' expected error type '{}', got '{:?}'",
                case.name,
                error_type,
                e
            ),
        }
    } else {
        panic!("Test '{}' has neither expected output nor error", case.name);
    }
}

fn error_type_matches(e: &TapestryError, expected: &str) -> bool {
    match (e, expected) {
        (TapestryError::Parse { .. }, "Parse") => true,
        (TapestryError::Eval(EvalError::Evaluation { .. }), "Evaluation") => true,
        (TapestryError::Eval(EvalError::Resolution { .. }), "Resolution") => true,
        (TapestryError::Eval(EvalError::BooleanRequired { .. }), "BooleanRequired") => true,
        (TapestryError::Eval(EvalError::EmptyEvaluation { .. }), "EmptyEvaluation") => true,
        _ => false,
    }
}

fn run_test_suite(filename: &str, skip_tests: &[&str]) {
    let suite = load_test_suite(filename);
    let mut passed = 0;
    let mut skipped = 0;

    for case in &suite.tests {
        if skip_tests.contains(&case.name.as_str()) {
            skipped += 1;
            continue;
        }
        run_test_case(case);
        passed += 1;
    }

    eprintln!(
        "{} ({}): {} tests passed, {} skipped",
        filename, suite.description, passed, skipped
    );
}

#[test]
fn test_operators() {
    run_test_suite("operators.json", &[]);
}

#[test]
fn test_statements() {
    run_test_suite("statements.json", &[]);
}

#[test]
fn test_services() {
    run_test_suite("services.json", &[]);
}

#[test]
fn test_errors() {
    run_test_suite("errors.json", &[]);
}
