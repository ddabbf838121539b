//! Checks the workflow shipped in `workflows/` against the default bindings.

use kontext_core::workflow::{self, TemplateBindings, WorkflowTemplate, LOAD_IMAGE_CLASS};

const BUNDLED: &str = include_str!("../../../workflows/Kontext_Image_Edit.json");

fn template() -> WorkflowTemplate {
    WorkflowTemplate::from_json(BUNDLED).expect("bundled workflow should parse")
}

// ---------------------------------------------------------------------------
// Test: default bindings match the bundled workflow
// ---------------------------------------------------------------------------

#[test]
fn bundled_workflow_has_every_bound_node() {
    let template = template();
    for (role, node_id) in TemplateBindings::default().required_nodes() {
        assert!(template.contains(node_id), "missing {role} node {node_id}");
    }
    assert_eq!(template.node("13").unwrap().class_type, LOAD_IMAGE_CLASS);
}

/// An instantiated job from the bundled template passes validation
/// without errors or warnings.
#[test]
fn instantiated_bundled_workflow_is_clean() {
    let template = template();
    let bindings = TemplateBindings::default();

    let payload = workflow::instantiate(&template, &bindings, "cat.png", "add a red scarf").unwrap();
    let report = workflow::validate(payload.workflow(), &bindings);

    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
}

/// The raw template has empty parameters, which only produce warnings.
#[test]
fn raw_bundled_template_only_warns() {
    let report = workflow::validate(&template(), &TemplateBindings::default());
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 2);
}
