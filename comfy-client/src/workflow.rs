//! Workflow templates with explicit slot bindings.
//!
//! A template is a ComfyUI workflow in API format plus a mapping from each
//! semantic role (positive prompt, negative prompt, seed, ...) to the node
//! input that receives it. Bindings are checked against the graph when the
//! template is built, so a workflow that does not have the expected slots is
//! rejected up front instead of being patched by guesswork.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ComfyError, Result};
use crate::request::GenerationRequest;

/// A semantic input of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Positive,
    Negative,
    Seed,
    Steps,
    Width,
    Height,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Seed => "seed",
            Self::Steps => "steps",
            Self::Width => "width",
            Self::Height => "height",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node input in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotBinding {
    /// Node id, e.g. `"6"`.
    pub node: String,

    /// Input key on that node, e.g. `"text"`.
    pub input: String,
}

impl SlotBinding {
    pub fn new(node: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            input: input.into(),
        }
    }
}

/// Where each role is written.
///
/// The defaults match the node ids of ComfyUI's stock text-to-image graph
/// (`3` KSampler, `5` EmptyLatentImage, `6`/`7` CLIPTextEncode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotBindings {
    pub positive: SlotBinding,
    pub negative: SlotBinding,
    pub seed: SlotBinding,
    #[serde(default)]
    pub steps: Option<SlotBinding>,
    #[serde(default)]
    pub width: Option<SlotBinding>,
    #[serde(default)]
    pub height: Option<SlotBinding>,
}

impl SlotBindings {
    /// Every bound role with its slot.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &SlotBinding)> {
        [
            (Role::Positive, Some(&self.positive)),
            (Role::Negative, Some(&self.negative)),
            (Role::Seed, Some(&self.seed)),
            (Role::Steps, self.steps.as_ref()),
            (Role::Width, self.width.as_ref()),
            (Role::Height, self.height.as_ref()),
        ]
        .into_iter()
        .filter_map(|(role, binding)| binding.map(|b| (role, b)))
    }
}

impl Default for SlotBindings {
    fn default() -> Self {
        Self {
            positive: SlotBinding::new("6", "text"),
            negative: SlotBinding::new("7", "text"),
            seed: SlotBinding::new("3", "seed"),
            steps: Some(SlotBinding::new("3", "steps")),
            width: Some(SlotBinding::new("5", "width")),
            height: Some(SlotBinding::new("5", "height")),
        }
    }
}

/// A validated workflow graph ready to be filled in per request.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Map<String, Value>,
    bindings: SlotBindings,
}

impl WorkflowTemplate {
    /// Build a template from API-format JSON.
    ///
    /// Accepts both the bare graph and the `{"prompt": graph}` envelope that
    /// the `/prompt` endpoint takes.
    pub fn new(workflow: Value, bindings: SlotBindings) -> Result<Self> {
        let graph = unwrap_graph(workflow)?;

        for (id, node) in &graph {
            if node.get("class_type").and_then(Value::as_str).is_none() {
                return Err(ComfyError::InvalidWorkflow(format!(
                    "node {id:?} has no class_type"
                )));
            }
        }

        for (role, binding) in bindings.iter() {
            let node = graph.get(&binding.node).ok_or_else(|| ComfyError::UnknownNode {
                role,
                node: binding.node.clone(),
            })?;
            let has_input = node
                .get("inputs")
                .and_then(Value::as_object)
                .is_some_and(|inputs| inputs.contains_key(&binding.input));
            if !has_input {
                return Err(ComfyError::UnknownInput {
                    role,
                    node: binding.node.clone(),
                    input: binding.input.clone(),
                });
            }
        }

        debug!("Validated workflow with {} nodes", graph.len());
        Ok(Self { graph, bindings })
    }

    /// Read and validate a template file.
    pub async fn load(path: impl AsRef<Path>, bindings: SlotBindings) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).await?;
        let template = Self::new(serde_json::from_str(&raw)?, bindings)?;
        info!(
            "Loaded workflow template {} ({} nodes)",
            path.display(),
            template.node_count()
        );
        Ok(template)
    }

    pub fn bindings(&self) -> &SlotBindings {
        &self.bindings
    }

    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    /// Produce the graph for one request.
    pub fn render(&self, request: &GenerationRequest) -> Value {
        let mut graph = self.graph.clone();

        for (role, binding) in self.bindings.iter() {
            let value = match role {
                Role::Positive => Some(Value::from(request.prompt.as_str())),
                Role::Negative => Some(Value::from(request.negative_prompt.as_str())),
                Role::Seed => Some(Value::from(request.seed)),
                Role::Steps => request.steps.map(Value::from),
                Role::Width => request.width.map(Value::from),
                Role::Height => request.height.map(Value::from),
            };
            let Some(value) = value else {
                continue;
            };
            if let Some(slot) = graph
                .get_mut(&binding.node)
                .and_then(|node| node.get_mut("inputs"))
                .and_then(|inputs| inputs.get_mut(&binding.input))
            {
                *slot = value;
            }
        }

        Value::Object(graph)
    }
}

fn unwrap_graph(workflow: Value) -> Result<Map<String, Value>> {
    let Value::Object(mut top) = workflow else {
        return Err(ComfyError::InvalidWorkflow(
            "workflow must be a JSON object".to_string(),
        ));
    };

    if top.get("nodes").is_some_and(Value::is_array) {
        return Err(ComfyError::InvalidWorkflow(
            "this is a UI-format export; save the workflow in API format".to_string(),
        ));
    }

    if top.get("prompt").is_some_and(Value::is_object) {
        if let Some(Value::Object(inner)) = top.remove("prompt") {
            return Ok(inner);
        }
    }

    Ok(top)
}
