//! The bounded agent loop.
//!
//! One execution alternates model turns and tool calls until the model
//! answers without requesting tools. A step is one turn that requested tools,
//! however many calls it made; the first tool-requesting turn is step 1. The
//! loop is bounded by a step budget and an overall deadline, and can be
//! cancelled through a [`CancellationToken`].
//!
//! Every execution emits `start`, zero or more `step` events, and exactly one
//! terminal `complete` or `error` event.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    ChannelEventSink, ChatMessage, Credential, EngineSettings, ExecutionError, ExecutionErrorCode,
    ExecutionEvent, ExecutionEventSink, ExecutionEventType, ExecutionState, ExecutionStatus,
    MessageRole, ModelProvider, ModelTurn, NodeContext, Workflow,
};
use uuid::Uuid;

use crate::bridge::{BoundTools, ToolBridge, ToolCallError};

/// Runs workflows against a model provider and a tool bridge.
#[derive(Clone)]
pub struct Engine {
    settings: EngineSettings,
    model: Arc<dyn ModelProvider>,
    bridge: ToolBridge,
}

impl Engine {
    pub fn new(model: Arc<dyn ModelProvider>, bridge: ToolBridge) -> Self {
        Self {
            settings: EngineSettings::with_defaults(),
            model,
            bridge,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub const fn bridge(&self) -> &ToolBridge {
        &self.bridge
    }

    /// Execute `workflow` on `input`, streaming events into `sink`.
    ///
    /// # Errors
    ///
    /// `MAX_STEPS_EXCEEDED` when the step budget runs out, `TIMEOUT` when the
    /// overall deadline passes, `CANCELLED` when `cancel` fires, and
    /// `EXECUTION_FAILED` for model or infrastructure failures. The matching
    /// `error` event has already been emitted when this returns.
    pub async fn run(
        &self,
        workflow: &Workflow,
        input: Value,
        credentials: Vec<Credential>,
        sink: &dyn ExecutionEventSink,
        cancel: &CancellationToken,
    ) -> Result<Value, ExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        let execution_id = Uuid::new_v4().to_string();

        tracing::info!(
            workflow_id = %workflow.id,
            trace_id = %trace_id,
            credential_types = ?credentials.iter().map(|c| c.credential_type.as_str()).collect::<Vec<_>>(),
            "Execution starting"
        );

        sink.emit(ExecutionEvent::new(
            ExecutionEventType::Start,
            &trace_id,
            object(json!({
                "workflow_id": workflow.id,
                "workflow_name": workflow.name,
                "input": input,
            })),
        ));

        let credentials: HashMap<String, Credential> = credentials
            .into_iter()
            .map(|c| (c.credential_type.clone(), c))
            .collect();

        let mut execution = Execution {
            model: self.model.as_ref(),
            tools: self.bridge.bind(&workflow.graph),
            ctx: NodeContext::new(execution_id, &trace_id).with_credentials(credentials),
            sink,
            interrupt: Interrupt::new(cancel.clone(), self.settings.execution_timeout()),
            trace_id: trace_id.clone(),
            max_steps: self.settings.effective_max_steps(),
            state: ExecutionState::new(ChatMessage::user(input_message(&input))),
        };
        execution.state.transition(ExecutionStatus::Running);

        if let Err(reason) = workflow.graph.validate() {
            return execution.finish(Err(ExecutionError::failed(reason)));
        }

        // Every await inside the loop races the interrupt itself, so a
        // cancelled or timed-out execution still closes its tool connections.
        let outcome = AssertUnwindSafe(execution.turns())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ExecutionError::failed(format!(
                    "Execution panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        execution.finish(outcome)
    }

    /// Run an execution on its own task.
    ///
    /// Returns the event stream and a handle resolving to the final result.
    pub fn spawn(
        &self,
        workflow: Workflow,
        input: Value,
        credentials: Vec<Credential>,
        cancel: CancellationToken,
    ) -> (
        mpsc::UnboundedReceiver<ExecutionEvent>,
        JoinHandle<Result<Value, ExecutionError>>,
    ) {
        let (sink, events) = ChannelEventSink::channel();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .run(&workflow, input, credentials, &sink, &cancel)
                .await
        });
        (events, handle)
    }
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365;

/// Why an execution has to stop early: its token was cancelled or its
/// overall deadline passed.
struct Interrupt {
    cancel: CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl Interrupt {
    fn new(cancel: CancellationToken, budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            cancel,
            deadline: now
                .checked_add(budget)
                .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS)),
            budget,
        }
    }

    fn check(&self) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            Err(ExecutionError::cancelled())
        } else if Instant::now() >= self.deadline {
            Err(ExecutionError::timeout(self.budget.as_secs()))
        } else {
            Ok(())
        }
    }

    /// Resolves once the execution must stop. Cancellation wins a tie.
    async fn fired(&self) -> ExecutionError {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => ExecutionError::cancelled(),
            () = tokio::time::sleep_until(self.deadline) => {
                ExecutionError::timeout(self.budget.as_secs())
            }
        }
    }
}

struct Execution<'a> {
    model: &'a dyn ModelProvider,
    tools: BoundTools,
    ctx: NodeContext,
    sink: &'a dyn ExecutionEventSink,
    interrupt: Interrupt,
    trace_id: String,
    max_steps: u32,
    state: ExecutionState,
}

impl Execution<'_> {
    async fn turns(&mut self) -> Result<Value, ExecutionError> {
        let specs = self.tools.specs();

        loop {
            self.interrupt.check()?;

            let turn = tokio::select! {
                biased;
                err = self.interrupt.fired() => return Err(err),
                turn = self.model.complete(&self.state.messages, &specs) => turn
                    .map_err(|e| ExecutionError::failed(format!("Model call failed: {e}")))?,
            };

            if !turn.requests_tools() {
                self.state
                    .messages
                    .push(ChatMessage::assistant(turn.content.unwrap_or_default(), Vec::new()));
                return Ok(extract_output(&self.state.messages));
            }

            let step = self.state.current_step + 1;
            if step > self.max_steps {
                tracing::warn!(
                    trace_id = %self.trace_id,
                    max_steps = self.max_steps,
                    "Step budget exhausted"
                );
                return Err(ExecutionError::max_steps_exceeded(self.max_steps));
            }

            let (data, node_id) = self.run_tools(turn).await?;
            self.state.current_step = step;

            let mut event =
                ExecutionEvent::new(ExecutionEventType::Step, &self.trace_id, data).with_step(step);
            if let Some(node_id) = node_id {
                event = event.with_node(node_id);
            }
            self.sink.emit(event);
        }
    }

    /// Run every call of a tool-requesting turn in order.
    ///
    /// Returns the step payload and, when the turn made a single successful
    /// call, the node it ran.
    async fn run_tools(
        &mut self,
        turn: ModelTurn,
    ) -> Result<(Map<String, Value>, Option<String>), ExecutionError> {
        let content = turn.content.unwrap_or_default();
        let calls = turn.tool_calls;
        self.state
            .messages
            .push(ChatMessage::assistant(content.clone(), calls.clone()));

        let mut observations = Vec::with_capacity(calls.len());
        let mut node_ids = Vec::with_capacity(calls.len());

        for call in &calls {
            self.interrupt.check()?;

            let outcome = self
                .tools
                .call_until(
                    &call.name,
                    call.arguments.clone(),
                    &self.ctx,
                    self.interrupt.fired(),
                )
                .await;

            let (observation, is_error) = match outcome {
                Ok(output) => {
                    let observation = output.observation();
                    node_ids.push(output.node_id.clone());
                    self.state.node_outputs.insert(output.node_id, output.value);
                    (observation, false)
                }
                Err(ToolCallError::Interrupted(err)) => return Err(err),
                Err(err) if err.is_observation() => {
                    tracing::warn!(
                        trace_id = %self.trace_id,
                        tool = %call.name,
                        error = %err,
                        "Tool call failed, reporting to model"
                    );
                    (format!("Error: {err}"), true)
                }
                Err(err) => {
                    tracing::error!(
                        trace_id = %self.trace_id,
                        tool = %call.name,
                        error = %err,
                        "Tool call failed"
                    );
                    return Err(ExecutionError::failed(err.to_string()));
                }
            };

            observations.push(json!({
                "tool_call_id": call.id,
                "name": call.name,
                "content": observation,
                "is_error": is_error,
            }));
            self.state.messages.push(ChatMessage::tool(call, observation));
        }

        let data = object(json!({
            "agent": {
                "content": content,
                "tool_calls": calls,
            },
            "tools": observations,
        }));
        let node_id = if calls.len() == 1 { node_ids.pop() } else { None };
        Ok((data, node_id))
    }

    /// Record the terminal status and emit the single terminal event.
    fn finish(mut self, outcome: Result<Value, ExecutionError>) -> Result<Value, ExecutionError> {
        let steps = self.state.current_step;

        match outcome {
            Ok(output) => {
                self.state.transition(ExecutionStatus::Completed);
                tracing::info!(trace_id = %self.trace_id, steps, "Execution completed");
                self.sink.emit(ExecutionEvent::new(
                    ExecutionEventType::Complete,
                    &self.trace_id,
                    object(json!({
                        "output": output,
                        "steps_completed": steps,
                        "node_outputs": self.state.node_outputs,
                    })),
                ));
                Ok(output)
            }
            Err(err) => {
                let status = match err.code {
                    ExecutionErrorCode::Timeout => ExecutionStatus::Timeout,
                    ExecutionErrorCode::Cancelled => ExecutionStatus::Cancelled,
                    ExecutionErrorCode::MaxStepsExceeded | ExecutionErrorCode::ExecutionFailed => {
                        ExecutionStatus::Failed
                    }
                };
                self.state.transition(status);
                self.state.error = Some(err.message.clone());
                tracing::error!(
                    trace_id = %self.trace_id,
                    error_code = err.code.as_str(),
                    error = %err.message,
                    steps,
                    "Execution failed"
                );
                self.sink.emit(ExecutionEvent::new(
                    ExecutionEventType::Error,
                    &self.trace_id,
                    object(json!({
                        "error": err.message,
                        "error_type": err.code.as_str(),
                        "steps_completed": steps,
                    })),
                ));
                Err(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// The first user message: strings verbatim, anything else as JSON text.
fn input_message(input: &Value) -> String {
    match input {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The last tool observation if any tool ran, else the model's final answer.
fn extract_output(messages: &[ChatMessage]) -> Value {
    if let Some(observation) = messages.iter().rev().find(|m| m.role == MessageRole::Tool) {
        return json!({ "result": observation.content, "type": "tool_result" });
    }
    let answer = messages
        .last()
        .filter(|m| m.role == MessageRole::Assistant)
        .map(|m| m.content.clone());
    json!({ "result": answer, "type": "ai_response" })
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_core::ToolCallRequest;

    #[test]
    fn test_extract_output_prefers_last_tool_observation() {
        let call = ToolCallRequest::new("c1", "calculator", json!({}));
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("", vec![call.clone()]),
            ChatMessage::tool(&call, "42"),
            ChatMessage::assistant("The answer is 42", Vec::new()),
        ];
        assert_eq!(
            extract_output(&messages),
            json!({"result": "42", "type": "tool_result"})
        );
    }

    #[test]
    fn test_extract_output_falls_back_to_answer() {
        let messages = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello", Vec::new())];
        assert_eq!(
            extract_output(&messages),
            json!({"result": "hello", "type": "ai_response"})
        );
    }

    #[test]
    fn test_panic_message_reads_both_payload_kinds() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(literal.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(owned.as_ref()), "bang");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn test_input_message() {
        assert_eq!(input_message(&json!("plain")), "plain");
        assert_eq!(input_message(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
