//! Conversational flow configuration.
//!
//! The sales assistant's dialogue is a static graph executed by an external
//! flow engine. This module only loads the graph and checks that it is
//! structurally sound; it never runs a conversation.
//!
//! ```json
//! {
//!   "initial_node": "greeting",
//!   "nodes": {
//!     "greeting": {
//!       "task_messages": [{"role": "user", "content": "..."}],
//!       "functions": [{
//!         "type": "function",
//!         "function": {
//!           "name": "collect_requirements",
//!           "description": "Collect customer requirements",
//!           "parameters": {"type": "object", "properties": {...}},
//!           "transition_to": "recommend"
//!         }
//!       }]
//!     }
//!   }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub initial_node: String,
    pub nodes: BTreeMap<String, FlowNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowNode {
    #[serde(default)]
    pub role_messages: Vec<Message>,
    #[serde(default)]
    pub task_messages: Vec<Message>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub pre_actions: Vec<Action>,
    #[serde(default)]
    pub post_actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(rename = "type", default = "default_function_type")]
    pub kind: String,
    pub function: FunctionDef,
}

fn default_function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments.
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub transition_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlowReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FlowReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl FlowConfig {
    pub fn validate(&self) -> FlowReport {
        let mut report = FlowReport::default();

        if !self.nodes.contains_key(&self.initial_node) {
            report.errors.push(format!(
                "initial_node '{}' is not defined",
                self.initial_node
            ));
        }

        for (name, node) in &self.nodes {
            let mut seen = HashSet::new();
            for spec in &node.functions {
                let f = &spec.function;
                if spec.kind != "function" {
                    report.errors.push(format!(
                        "node '{}': function '{}' has type '{}', expected 'function'",
                        name, f.name, spec.kind
                    ));
                }
                if f.name.trim().is_empty() {
                    report
                        .errors
                        .push(format!("node '{}': function with empty name", name));
                } else if !seen.insert(f.name.as_str()) {
                    report.errors.push(format!(
                        "node '{}': function '{}' is declared more than once",
                        name, f.name
                    ));
                }
                if let Some(target) = &f.transition_to {
                    if !self.nodes.contains_key(target) {
                        report.errors.push(format!(
                            "node '{}': function '{}' transitions to unknown node '{}'",
                            name, f.name, target
                        ));
                    }
                }
                if let Some(params) = &f.parameters {
                    check_parameters(name, &f.name, params, &mut report);
                }
            }
            if node.task_messages.is_empty() {
                report
                    .warnings
                    .push(format!("node '{}' has no task_messages", name));
            }
        }

        for unreachable in self.unreachable_nodes() {
            report
                .warnings
                .push(format!("node '{}' is unreachable from '{}'", unreachable, self.initial_node));
        }

        report
    }

    /// Nodes that no chain of transitions from `initial_node` reaches.
    pub fn unreachable_nodes(&self) -> Vec<&str> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        if self.nodes.contains_key(&self.initial_node) {
            queue.push_back(self.initial_node.as_str());
        }
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                for target in node
                    .functions
                    .iter()
                    .filter_map(|f| f.function.transition_to.as_deref())
                {
                    if self.nodes.contains_key(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        self.nodes
            .keys()
            .map(String::as_str)
            .filter(|n| !visited.contains(n))
            .collect()
    }
}

fn check_parameters(node: &str, function: &str, params: &Value, report: &mut FlowReport) {
    let Some(schema) = params.as_object() else {
        report.errors.push(format!(
            "node '{}': parameters of '{}' must be a JSON object",
            node, function
        ));
        return;
    };
    if let Some(kind) = schema.get("type") {
        if kind.as_str() != Some("object") {
            report.errors.push(format!(
                "node '{}': parameters of '{}' must have type 'object'",
                node, function
            ));
        }
    }
    let properties = match schema.get("properties") {
        None => None,
        Some(Value::Object(props)) => Some(props),
        Some(_) => {
            report.errors.push(format!(
                "node '{}': properties of '{}' must be an object",
                node, function
            ));
            return;
        }
    };
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !properties.is_some_and(|p| p.contains_key(name)) {
                report.errors.push(format!(
                    "node '{}': '{}' requires undeclared parameter '{}'",
                    node, function, name
                ));
            }
        }
    }
}

pub fn load_flow(path: &Path) -> Result<FlowConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flow file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse flow file: {}", path.display()))
}

/// CLI entry point for `psync flow check`.
pub fn run_flow_check(path: &Path) -> Result<()> {
    let flow = load_flow(path)?;
    let report = flow.validate();

    println!("flow {}", path.display());
    println!("  initial node: {}", flow.initial_node);
    println!("  nodes: {}", flow.nodes.len());
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }

    if !report.is_ok() {
        bail!("flow has {} error(s)", report.errors.len());
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow(value: Value) -> FlowConfig {
        serde_json::from_value(value).unwrap()
    }

    fn function(name: &str, target: Option<&str>) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": "",
                "parameters": {
                    "type": "object",
                    "properties": {"interest": {"type": "boolean"}},
                    "required": ["interest"]
                },
                "transition_to": target
            }
        })
    }

    #[test]
    fn well_formed_flow_passes() {
        let f = flow(json!({
            "initial_node": "greeting",
            "nodes": {
                "greeting": {
                    "task_messages": [{"role": "user", "content": "hi"}],
                    "functions": [function("check_interest", Some("close"))]
                },
                "close": {
                    "task_messages": [{"role": "user", "content": "bye"}],
                    "post_actions": [{"type": "end_conversation"}]
                }
            }
        }));
        let report = f.validate();
        assert!(report.is_ok(), "{:?}", report);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn dangling_transition_and_missing_initial_are_errors() {
        let f = flow(json!({
            "initial_node": "start",
            "nodes": {
                "greeting": {
                    "task_messages": [{"role": "user", "content": "hi"}],
                    "functions": [function("check_interest", Some("nowhere"))]
                }
            }
        }));
        let report = f.validate();
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.contains("'nowhere'")));
        assert!(report.errors.iter().any(|e| e.contains("initial_node")));
    }

    #[test]
    fn duplicate_functions_and_undeclared_required_params() {
        let mut bad = function("collect", None);
        bad["function"]["parameters"]["required"] = json!(["requirements"]);
        let f = flow(json!({
            "initial_node": "a",
            "nodes": {
                "a": {
                    "task_messages": [{"role": "user", "content": "hi"}],
                    "functions": [function("collect", None), bad]
                }
            }
        }));
        let report = f.validate();
        assert!(report.errors.iter().any(|e| e.contains("more than once")));
        assert!(report.errors.iter().any(|e| e.contains("'requirements'")));
    }

    #[test]
    fn unreachable_nodes_are_warnings() {
        let f = flow(json!({
            "initial_node": "a",
            "nodes": {
                "a": {"task_messages": [{"role": "user", "content": "hi"}]},
                "orphan": {"task_messages": [{"role": "user", "content": "?"}]}
            }
        }));
        let report = f.validate();
        assert!(report.is_ok());
        assert_eq!(f.unreachable_nodes(), vec!["orphan"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn cyclic_flow_terminates() {
        let f = flow(json!({
            "initial_node": "dates",
            "nodes": {
                "dates": {
                    "task_messages": [{"role": "user", "content": "when?"}],
                    "functions": [function("verify", Some("verify"))]
                },
                "verify": {
                    "task_messages": [{"role": "user", "content": "ok?"}],
                    "functions": [function("revise", Some("dates"))]
                }
            }
        }));
        assert!(f.unreachable_nodes().is_empty());
        assert!(f.validate().is_ok());
    }
}
