//! Tool bridge.
//!
//! Turns the nodes of a workflow graph into tools the model can call. Each
//! bound tool carries its node's static config, which is merged under the
//! model's arguments, validated against the node's declared inputs, and then
//! dispatched either to an in-process node or through the gateway to a tool
//! server.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{Map, Value};
use thiserror::Error;
use toolgate_core::{
    ExecutionError, NodeBinding, NodeCatalog, NodeContext, NodeDefinition, NodeError, NodeErrorCode,
    NodeExecutionError, NodeValidationError, ToolSpec, WorkflowGraph,
};
use toolgate_mcp::{Gateway, GatewayError};

/// Why a tool call produced no output.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// The model asked for a tool that is not bound in this execution.
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The execution was cancelled or ran out of time mid-call.
    #[error(transparent)]
    Interrupted(ExecutionError),
}

impl ToolCallError {
    /// Whether the failure belongs to the tool and should be shown to the model
    /// as an observation. Infrastructure failures return `false`.
    pub const fn is_observation(&self) -> bool {
        match self {
            Self::UnknownTool(_) | Self::Node(_) => true,
            Self::Gateway(err) => err.is_tool_error(),
            Self::Interrupted(_) => false,
        }
    }
}

impl From<NodeValidationError> for ToolCallError {
    fn from(err: NodeValidationError) -> Self {
        Self::Node(err.into())
    }
}

impl From<NodeExecutionError> for ToolCallError {
    fn from(err: NodeExecutionError) -> Self {
        Self::Node(err.into())
    }
}

/// Successful output of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// The graph node that produced it.
    pub node_id: String,
    pub value: Value,
}

impl ToolOutput {
    /// Render the output as the text the model observes.
    pub fn observation(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// One graph node exposed as a tool.
#[derive(Debug, Clone)]
pub struct BoundTool {
    name: String,
    node_id: String,
    definition: NodeDefinition,
    binding: NodeBinding,
    config: Map<String, Value>,
}

impl BoundTool {
    /// Tool name shown to the model.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub const fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.definition.description.clone(),
            parameters: self.definition.parameters_schema(),
        }
    }

    /// Merge static config with the model's arguments (arguments win) and
    /// validate the result against the declared inputs.
    ///
    /// # Errors
    ///
    /// Fails when the arguments are not an object or an input is missing,
    /// mistyped, or outside its allowed options.
    pub fn prepare_input(&self, arguments: Value) -> Result<Map<String, Value>, NodeValidationError> {
        let mut input = self.config.clone();
        match arguments {
            Value::Object(args) => input.extend(args),
            Value::Null => {}
            // Some providers deliver arguments as serialized JSON.
            Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(args)) => input.extend(args),
                _ => return Err(NodeValidationError::new("Tool arguments must be a JSON object")),
            },
            _ => return Err(NodeValidationError::new("Tool arguments must be a JSON object")),
        }
        validate_inputs(&self.definition, &mut input)?;
        Ok(input)
    }
}

/// Apply defaults and check declared inputs. Undeclared keys pass through.
///
/// # Errors
///
/// Returns the first problem found, naming the offending field.
pub fn validate_inputs(
    definition: &NodeDefinition,
    input: &mut Map<String, Value>,
) -> Result<(), NodeValidationError> {
    for declared in &definition.inputs {
        let name = &declared.name;
        let present = input.get(name).is_some_and(|v| !v.is_null());

        if !present {
            if let Some(default) = &declared.default {
                input.insert(name.clone(), default.clone());
            } else if declared.required {
                return Err(NodeValidationError::for_field(
                    name.clone(),
                    format!("Missing required input: {name}"),
                ));
            }
            continue;
        }

        let Some(value) = input.get(name) else {
            continue;
        };
        if !declared.input_type.accepts(value) {
            return Err(NodeValidationError::for_field(
                name.clone(),
                format!(
                    "Input '{name}' must be of type {}",
                    declared.input_type.as_str()
                ),
            ));
        }
        if let Some(options) = &declared.options
            && let Some(choice) = value.as_str()
            && !options.iter().any(|o| o == choice)
        {
            return Err(NodeValidationError::for_field(
                name.clone(),
                format!(
                    "Invalid value for '{name}': {choice}. Expected one of: {}",
                    options.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

/// Builds bound tool sets for workflow graphs.
#[derive(Clone)]
pub struct ToolBridge {
    catalog: Arc<dyn NodeCatalog>,
    gateway: Gateway,
}

impl ToolBridge {
    pub fn new(catalog: Arc<dyn NodeCatalog>, gateway: Gateway) -> Self {
        Self { catalog, gateway }
    }

    pub fn catalog(&self) -> &dyn NodeCatalog {
        self.catalog.as_ref()
    }

    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Bind every resolvable node in `graph`.
    ///
    /// Nodes whose type is not in the catalog are logged and skipped. The
    /// first node of a type is named after the type; later nodes of the same
    /// type get the node id appended.
    pub fn bind(&self, graph: &WorkflowGraph) -> BoundTools {
        let mut tools = Vec::with_capacity(graph.nodes.len());
        let mut names = HashSet::new();

        for node in &graph.nodes {
            let Some(entry) = self.catalog.get(&node.node_type) else {
                tracing::warn!(
                    node_id = %node.id,
                    node_type = %node.node_type,
                    "Node type not found in catalog, skipping"
                );
                continue;
            };

            let name = unique_name(&mut names, &entry.definition.name, &node.id);

            tracing::debug!(node_id = %node.id, tool = %name, "Bound node as tool");
            tools.push(BoundTool {
                name,
                node_id: node.id.clone(),
                definition: entry.definition,
                binding: entry.binding,
                config: node.config.clone(),
            });
        }

        tracing::info!(
            node_count = graph.nodes.len(),
            tool_count = tools.len(),
            "Built tools from workflow nodes"
        );

        BoundTools {
            tools,
            gateway: self.gateway.clone(),
        }
    }
}

/// Claim a tool name for `node_id`: the type name if free, else the type
/// name suffixed with the node id, then with a counter until nothing clashes.
fn unique_name(taken: &mut HashSet<String>, node_type: &str, node_id: &str) -> String {
    let base = sanitize(node_type);
    if taken.insert(base.clone()) {
        return base;
    }

    let with_id = format!("{base}_{}", sanitize(node_id));
    let mut candidate = with_id.clone();
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{with_id}_{n}");
        n += 1;
    }
    candidate
}

/// Tool names may only contain ASCII letters, digits, `_` and `-`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// The tools bound for one execution.
pub struct BoundTools {
    tools: Vec<BoundTool>,
    gateway: Gateway,
}

impl BoundTools {
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(BoundTool::spec).collect()
    }

    pub fn get(&self, name: &str) -> Option<&BoundTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundTool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the tool `name` with the model's `arguments`.
    ///
    /// # Errors
    ///
    /// Node validation/execution failures (including a missing credential)
    /// and tool-reported failures are observations; see
    /// [`ToolCallError::is_observation`]. Everything else is fatal.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
        ctx: &NodeContext,
    ) -> Result<ToolOutput, ToolCallError> {
        self.call_until(name, arguments, ctx, std::future::pending())
            .await
    }

    /// Like [`BoundTools::call`], but gives up as soon as `interrupt`
    /// resolves. A tool-server connection opened for the call is still
    /// closed before this returns.
    ///
    /// # Errors
    ///
    /// `ToolCallError::Interrupted` carrying the interrupt's error, or as for
    /// [`BoundTools::call`].
    pub async fn call_until<I>(
        &self,
        name: &str,
        arguments: Value,
        ctx: &NodeContext,
        interrupt: I,
    ) -> Result<ToolOutput, ToolCallError>
    where
        I: Future<Output = ExecutionError>,
    {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;
        let definition = &tool.definition;

        if let Some(credential_type) = definition.credential_type.as_deref()
            && ctx.credential(credential_type).is_none()
        {
            return Err(NodeExecutionError::missing_credential(&definition.name, credential_type).into());
        }

        let input = tool.prepare_input(arguments)?;
        tracing::info!(
            node_id = %tool.node_id,
            node_type = %definition.name,
            input_keys = ?input.keys().collect::<Vec<_>>(),
            "Executing node"
        );

        let value = match &tool.binding {
            NodeBinding::Local(node) => tokio::select! {
                biased;
                err = interrupt => return Err(ToolCallError::Interrupted(err)),
                value = node.execute(input, ctx) => value?,
            },
            NodeBinding::Mcp { tool: remote } => {
                let server_id = definition.mcp_server_id.as_deref().ok_or_else(|| {
                    NodeExecutionError::new(
                        &definition.name,
                        NodeErrorCode::ExecutionError,
                        "Node has no tool server",
                    )
                })?;
                let credential = definition
                    .credential_type
                    .as_deref()
                    .and_then(|t| ctx.credential(t));
                let remote = remote.clone();
                let arguments = Value::Object(input);

                let interrupt = async move { ToolCallError::Interrupted(interrupt.await) };

                let result = self
                    .gateway
                    .connection_until(server_id, credential, interrupt, move |conn| {
                        async move {
                            let result = conn.call_tool(&remote, arguments).await?;
                            Ok::<_, ToolCallError>(result)
                        }
                        .boxed()
                    })
                    .await?;
                Value::String(result.to_text())
            }
        };

        Ok(ToolOutput {
            node_id: tool.node_id.clone(),
            value,
        })
    }
}
