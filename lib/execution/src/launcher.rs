//! Topological expansion of a workflow into execution inputs.
//!
//! Given the workflow's nodes, edges and resolved scripts, this builds one
//! `ExecutionInput` per node with its initial dependency count (the node's
//! in-degree) and its resolved script path. Pure: the service fetches the
//! records and inserts the rows around this.

use chrono::Utc;
use miniflow_core::{CustomScriptId, ExecutionInputId, ScriptId};
use miniflow_store::paths::ScriptRoots;
use miniflow_workflow::edge::Edge;
use miniflow_workflow::error::EngineError;
use miniflow_workflow::execution::{Execution, ExecutionInput};
use miniflow_workflow::graph::WorkflowDag;
use miniflow_workflow::node::{Node, ScriptRef, Workflow};
use miniflow_workflow::param::extract_input_params;
use miniflow_workflow::script::{CustomScript, Script};
use std::collections::HashMap;

/// Builds the execution-input rows for every node of a workflow.
///
/// # Errors
///
/// Fails when the graph is malformed, a node's script is missing or
/// unsafe, a custom script belongs to another workspace, or a required
/// parameter has no value.
pub fn plan_execution_inputs(
    execution: &Execution,
    workflow: &Workflow,
    nodes: &[Node],
    edges: &[Edge],
    scripts: &[Script],
    custom_scripts: &[CustomScript],
    roots: &ScriptRoots,
) -> Result<Vec<ExecutionInput>, EngineError> {
    let dag = WorkflowDag::from_records(nodes, edges)?;
    let in_degrees = dag.in_degree_map();

    let scripts: HashMap<ScriptId, &Script> = scripts.iter().map(|s| (s.id, s)).collect();
    let custom_scripts: HashMap<CustomScriptId, &CustomScript> =
        custom_scripts.iter().map(|s| (s.id, s)).collect();

    let mut inputs = Vec::with_capacity(nodes.len());
    for node in nodes {
        let (script_name, script_path) = match node.executable {
            ScriptRef::Global { script_id } => {
                let script = scripts.get(&script_id).ok_or_else(|| {
                    EngineError::invalid_input("script_id", "node has no script")
                })?;
                let path = roots
                    .global_script_path(&script.file_path)
                    .map_err(|e| EngineError::invalid_input("script_id", e.to_string()))?;
                (script.name.clone(), path)
            }
            ScriptRef::Custom { custom_script_id } => {
                let script = custom_scripts.get(&custom_script_id).ok_or_else(|| {
                    EngineError::invalid_input("custom_script_id", "node has no script")
                })?;
                if script.workspace_id != execution.workspace_id {
                    return Err(EngineError::invalid_input(
                        "custom_script_id",
                        format!(
                            "custom script {} does not belong to workspace {}",
                            script.id, execution.workspace_id
                        ),
                    ));
                }
                let path = roots
                    .custom_script_path(script.workspace_id, &script.file_path)
                    .map_err(|e| EngineError::invalid_input("custom_script_id", e.to_string()))?;
                (script.name.clone(), path)
            }
        };

        let params = extract_input_params(&node.input_params)?;
        let dependency_count = in_degrees.get(&node.id).copied().unwrap_or(0);

        inputs.push(ExecutionInput {
            id: ExecutionInputId::new(),
            execution_id: execution.id,
            workspace_id: execution.workspace_id,
            workflow_id: workflow.id,
            node_id: node.id,
            node_name: node.name.clone(),
            script_name,
            script_path: script_path.to_string_lossy().into_owned(),
            params,
            dependency_count: dependency_count as i32,
            wait_factor: 0,
            priority: workflow.priority,
            max_retries: node.max_retries,
            timeout_seconds: node.timeout_seconds,
            created_at: Utc::now(),
        });
    }

    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniflow_core::{NodeId, WorkspaceId};
    use miniflow_workflow::param::ParamSpec;
    use serde_json::json;

    struct Fixture {
        execution: Execution,
        workflow: Workflow,
        script: Script,
        roots: ScriptRoots,
    }

    fn fixture() -> Fixture {
        let workspace_id = WorkspaceId::new();
        let workflow = Workflow {
            id: miniflow_core::WorkflowId::new(),
            workspace_id,
            name: "Test".to_string(),
            priority: 5,
        };
        let execution = Execution::new(workspace_id, workflow.id, None, json!({}), None);
        let script = Script {
            id: ScriptId::new(),
            name: "echo".to_string(),
            file_path: "util/echo.py".to_string(),
            input_schema: None,
            output_schema: None,
        };
        Fixture {
            execution,
            workflow,
            script,
            roots: ScriptRoots::new("/srv/resources"),
        }
    }

    fn node(fixture: &Fixture, name: &str) -> Node {
        Node::new(fixture.workflow.id, name, fixture.script.id)
    }

    #[test]
    fn diamond_dependency_counts() {
        let fx = fixture();
        let a = node(&fx, "A");
        let b = node(&fx, "B");
        let c = node(&fx, "C");
        let d = node(&fx, "D");
        let edges = vec![
            Edge::new(fx.workflow.id, a.id, b.id),
            Edge::new(fx.workflow.id, a.id, c.id),
            Edge::new(fx.workflow.id, b.id, d.id),
            Edge::new(fx.workflow.id, c.id, d.id),
        ];
        let nodes = vec![a, b, c, d];

        let inputs = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &nodes,
            &edges,
            std::slice::from_ref(&fx.script),
            &[],
            &fx.roots,
        )
        .expect("should plan");

        assert_eq!(inputs.len(), 4);
        let count_of = |node_id: NodeId| {
            inputs
                .iter()
                .find(|i| i.node_id == node_id)
                .expect("input exists")
                .dependency_count
        };
        assert_eq!(count_of(nodes[0].id), 0);
        assert_eq!(count_of(nodes[1].id), 1);
        assert_eq!(count_of(nodes[2].id), 1);
        assert_eq!(count_of(nodes[3].id), 2);

        for input in &inputs {
            assert_eq!(input.priority, 5);
            assert_eq!(input.wait_factor, 0);
            assert_eq!(
                input.script_path,
                "/srv/resources/global_scripts/util/echo.py"
            );
        }
    }

    #[test]
    fn missing_script_fails() {
        let fx = fixture();
        let nodes = vec![node(&fx, "A")];

        let err = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &nodes,
            &[],
            &[], // script table empty
            &[],
            &fx.roots,
        )
        .unwrap_err();

        assert!(err.to_string().contains("node has no script"));
    }

    #[test]
    fn required_param_without_value_fails() {
        let fx = fixture();
        let bad_node = node(&fx, "A").with_param(
            "key",
            ParamSpec {
                param_type: "string".to_string(),
                value: None,
                required: true,
                default_value: None,
            },
        );

        let err = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &[bad_node],
            &[],
            std::slice::from_ref(&fx.script),
            &[],
            &fx.roots,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn params_are_copied_with_types() {
        let fx = fixture();
        let with_params = node(&fx, "A").with_param(
            "x",
            ParamSpec {
                param_type: "int".to_string(),
                value: Some(json!("${trigger:n}")),
                required: true,
                default_value: None,
            },
        );

        let inputs = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &[with_params],
            &[],
            std::slice::from_ref(&fx.script),
            &[],
            &fx.roots,
        )
        .expect("should plan");

        let entry = &inputs[0].params["x"];
        assert_eq!(entry.param_type, "int");
        assert_eq!(entry.value, json!("${trigger:n}"));
    }

    #[test]
    fn foreign_workspace_custom_script_fails() {
        let fx = fixture();
        let custom = CustomScript {
            id: CustomScriptId::new(),
            workspace_id: WorkspaceId::new(), // not the execution's workspace
            name: "mine".to_string(),
            file_path: "etl/run.py".to_string(),
            input_schema: None,
            output_schema: None,
        };
        let mut foreign_node = node(&fx, "A");
        foreign_node.executable = ScriptRef::Custom {
            custom_script_id: custom.id,
        };

        let err = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &[foreign_node],
            &[],
            &[],
            std::slice::from_ref(&custom),
            &fx.roots,
        )
        .unwrap_err();

        assert!(err.to_string().contains("does not belong to workspace"));
    }

    #[test]
    fn traversal_in_stored_path_fails() {
        let fx = fixture();
        let evil_script = Script {
            file_path: "../../etc/passwd".to_string(),
            ..fx.script.clone()
        };
        let nodes = vec![node(&fx, "A")];

        let err = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &nodes,
            &[],
            std::slice::from_ref(&evil_script),
            &[],
            &fx.roots,
        )
        .unwrap_err();

        assert!(err.to_string().contains("unsafe script path"));
    }

    #[test]
    fn cyclic_workflow_is_rejected() {
        let fx = fixture();
        let a = node(&fx, "A");
        let b = node(&fx, "B");
        let edges = vec![
            Edge::new(fx.workflow.id, a.id, b.id),
            Edge::new(fx.workflow.id, b.id, a.id),
        ];
        let nodes = vec![a, b];

        let err = plan_execution_inputs(
            &fx.execution,
            &fx.workflow,
            &nodes,
            &edges,
            std::slice::from_ref(&fx.script),
            &[],
            &fx.roots,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::BusinessRuleViolation { .. }));
    }
}
