//! Execution loop behavior against a scripted model and fake tool servers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use toolgate_agent::{Engine, InMemoryNodeCatalog, ToolBridge};
use toolgate_core::{
    ChannelEventSink, ChatMessage, Credential, EngineSettings, ExecutionErrorCode, ExecutionEvent,
    ExecutionEventType, InjectedAuth, MessageRole, ModelError, ModelProvider, ModelTurn,
    NodeInstance, ServerConfig, ToolCallRequest, ToolInfo, ToolResult, ToolSpec, TransportKind,
    Workflow, WorkflowGraph,
};
use toolgate_mcp::{Gateway, ServerRegistry, Transport, TransportError, TransportFactory};

/// Replays a fixed script of turns, then repeats `fallback` forever.
struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
    fallback: ModelTurn,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Self::with_fallback(turns, ModelTurn::text("done"))
    }

    fn with_fallback(turns: Vec<ModelTurn>, fallback: ModelTurn) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            fallback,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn history(&self, call: usize) -> Vec<ChatMessage> {
        self.seen.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self.turns.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Never answers; optionally cancels a token first.
struct StalledModel {
    cancel: Option<CancellationToken>,
}

#[async_trait]
impl ModelProvider for StalledModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError> {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        std::future::pending().await
    }
}

/// Panics mid-turn, as a buggy provider might.
struct PanickingModel;

#[async_trait]
impl ModelProvider for PanickingModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError> {
        let payload: Option<ModelTurn> = None;
        Ok(payload.expect("provider returned garbage"))
    }
}

struct BrokenModel;

#[async_trait]
impl ModelProvider for BrokenModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError> {
        Err(ModelError::Api {
            status: 500,
            message: "upstream exploded".into(),
        })
    }
}

#[derive(Default)]
struct ServerCounters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

struct FakeServer {
    counters: Arc<ServerCounters>,
    reachable: bool,
    /// Cancelled when a call to `#hang` starts.
    on_hang: Option<CancellationToken>,
}

#[async_trait]
impl Transport for FakeServer {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(())
        } else {
            Err(TransportError::Connection("connection refused".into()))
        }
    }

    async fn disconnect(&mut self) {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, TransportError> {
        Ok(vec![ToolInfo::new("send_message", "Send a message")])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        match arguments.get("channel").and_then(Value::as_str) {
            Some("#hang") => {
                if let Some(cancel) = &self.on_hang {
                    cancel.cancel();
                }
                std::future::pending().await
            }
            Some("#missing") => Err(TransportError::Tool("channel_not_found".into())),
            Some(channel) => Ok(ToolResult::text(format!("{name} -> {channel}"))),
            None => Err(TransportError::Tool("no channel".into())),
        }
    }

    fn is_connected(&self) -> bool {
        self.reachable
    }
}

struct FakeFactory {
    counters: Arc<ServerCounters>,
    reachable: bool,
    on_hang: Option<CancellationToken>,
}

impl TransportFactory for FakeFactory {
    fn create(
        &self,
        _config: &ServerConfig,
        _auth: &InjectedAuth,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(FakeServer {
            counters: Arc::clone(&self.counters),
            reachable: self.reachable,
            on_hang: self.on_hang.clone(),
        }))
    }
}

struct Harness {
    engine: Engine,
    counters: Arc<ServerCounters>,
}

fn harness(model: Arc<dyn ModelProvider>, settings: EngineSettings, reachable: bool) -> Harness {
    build_harness(model, settings, reachable, None)
}

fn build_harness(
    model: Arc<dyn ModelProvider>,
    settings: EngineSettings,
    reachable: bool,
    on_hang: Option<CancellationToken>,
) -> Harness {
    let registry = ServerRegistry::from_configs(vec![
        ServerConfig::streamable_http("slack", "Slack", "https://slack.example/mcp")
            .with_credential_type("slack_oauth"),
    ])
    .unwrap();
    let counters = Arc::new(ServerCounters::default());
    let gateway = Gateway::new(Arc::new(registry)).with_factory(Arc::new(FakeFactory {
        counters: Arc::clone(&counters),
        reachable,
        on_hang,
    }));
    let bridge = ToolBridge::new(Arc::new(InMemoryNodeCatalog::with_builtins()), gateway);

    Harness {
        engine: Engine::new(model, bridge).with_settings(settings),
        counters,
    }
}

fn settings(max_steps: u32) -> EngineSettings {
    EngineSettings {
        max_steps: Some(max_steps),
        ..EngineSettings::with_defaults()
    }
}

fn workflow(nodes: Vec<NodeInstance>) -> Workflow {
    Workflow::new("wf-1", "Test workflow", WorkflowGraph { nodes, edges: vec![] })
}

fn calc_call(id: &str, expression: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, "calculator", json!({ "expression": expression }))
}

fn slack_credential() -> Credential {
    Credential::new("slack_oauth").with_field("access_token", "xoxb-test")
}

fn drain(rx: &mut UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[ExecutionEvent]) -> Vec<ExecutionEventType> {
    events.iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn step_budget_stops_a_runaway_loop() {
    let model = ScriptedModel::with_fallback(
        vec![],
        ModelTurn::tools(vec![calc_call("c", "1 + 1")]),
    );
    let h = harness(model.clone(), settings(3), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = h
        .engine
        .run(
            &workflow(vec![NodeInstance::new("calc", "calculator")]),
            json!("loop forever"),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::MaxStepsExceeded);
    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [
            ExecutionEventType::Start,
            ExecutionEventType::Step,
            ExecutionEventType::Step,
            ExecutionEventType::Step,
            ExecutionEventType::Error,
        ]
    );
    let steps: Vec<Option<u32>> = events[1..4].iter().map(|e| e.step_number).collect();
    assert_eq!(steps, [Some(1), Some(2), Some(3)]);
    assert_eq!(events[4].data["error_type"], "MAX_STEPS_EXCEEDED");
    assert_eq!(events[4].data["steps_completed"], 3);
    // The fourth tool-requesting turn was asked for but never executed.
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn answer_without_tools_completes_with_zero_steps() {
    let model = ScriptedModel::new(vec![ModelTurn::text("hello there")]);
    let h = harness(model.clone(), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let output = h
        .engine
        .run(
            &workflow(vec![]),
            json!({"question": "hi"}),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output, json!({"result": "hello there", "type": "ai_response"}));
    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [ExecutionEventType::Start, ExecutionEventType::Complete]
    );
    assert_eq!(events[0].data["workflow_id"], "wf-1");
    assert_eq!(events[0].data["workflow_name"], "Test workflow");
    assert_eq!(events[0].data["input"], json!({"question": "hi"}));
    assert_eq!(events[1].data["steps_completed"], 0);
    assert!(events.iter().all(|e| e.trace_id == events[0].trace_id));

    let first = model.history(0);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].role, MessageRole::User);
    assert_eq!(first[0].content, r#"{"question":"hi"}"#);
}

#[tokio::test]
async fn tool_result_feeds_the_next_turn_and_becomes_output() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tools(vec![calc_call("c1", "2 + 2")]),
        ModelTurn::text("It is 4"),
    ]);
    let h = harness(model.clone(), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let output = h
        .engine
        .run(
            &workflow(vec![NodeInstance::new("calc", "calculator")]),
            json!("what is 2 + 2?"),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output, json!({"result": r#"{"result":4.0}"#, "type": "tool_result"}));

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [
            ExecutionEventType::Start,
            ExecutionEventType::Step,
            ExecutionEventType::Complete,
        ]
    );
    assert_eq!(events[1].step_number, Some(1));
    assert_eq!(events[1].node_id.as_deref(), Some("calc"));
    assert_eq!(events[1].data["tools"][0]["is_error"], false);
    assert_eq!(events[2].data["steps_completed"], 1);
    assert_eq!(events[2].data["node_outputs"]["calc"], json!({"result": 4.0}));

    let second = model.history(1);
    let observation = second.last().unwrap();
    assert_eq!(observation.role, MessageRole::Tool);
    assert_eq!(observation.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(observation.content, r#"{"result":4.0}"#);
}

#[tokio::test]
async fn parallel_calls_in_one_turn_are_one_step() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tools(vec![calc_call("a", "1 + 1"), calc_call("b", "2 * 3")]),
        ModelTurn::text("done"),
    ]);
    let h = harness(model, settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    h.engine
        .run(
            &workflow(vec![NodeInstance::new("calc", "calculator")]),
            json!("two sums"),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let events = drain(&mut rx);
    let steps: Vec<&ExecutionEvent> = events
        .iter()
        .filter(|e| e.event_type == ExecutionEventType::Step)
        .collect();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].data["tools"].as_array().unwrap().len(), 2);
    assert_eq!(steps[0].node_id, None);
    assert_eq!(events.last().unwrap().data["steps_completed"], 1);
}

#[tokio::test]
async fn node_errors_are_observations() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tools(vec![calc_call("c1", "1 / 0")]),
        ModelTurn::tools(vec![ToolCallRequest::new(
            "c2",
            "slack_send_message",
            json!({"channel": "#general", "message": "hi"}),
        )]),
        ModelTurn::text("gave up"),
    ]);
    let h = harness(model.clone(), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let output = h
        .engine
        .run(
            &workflow(vec![
                NodeInstance::new("calc", "calculator"),
                NodeInstance::new("notify", "slack_send_message"),
            ]),
            json!("divide"),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output["type"], "tool_result");
    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().event_type, ExecutionEventType::Complete);
    assert_eq!(events[1].data["tools"][0]["is_error"], true);

    let after_division = model.history(1);
    assert_eq!(
        after_division.last().unwrap().content,
        "Error: [DIVISION_BY_ZERO] calculator: Division by zero"
    );
    let after_slack = model.history(2);
    assert!(after_slack.last().unwrap().content.contains("MISSING_CREDENTIAL"));
    // No connection is attempted without the credential.
    assert_eq!(h.counters.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tool_server_calls_use_a_scoped_connection() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tools(vec![ToolCallRequest::new(
            "s1",
            "slack_send_message",
            json!({"channel": "#general", "message": "deploy done"}),
        )]),
        ModelTurn::tools(vec![ToolCallRequest::new(
            "s2",
            "slack_send_message",
            json!({"channel": "#missing", "message": "hello?"}),
        )]),
        ModelTurn::text("sent"),
    ]);
    let h = harness(model.clone(), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    h.engine
        .run(
            &workflow(vec![NodeInstance::new("notify", "slack_send_message")]),
            json!("announce"),
            vec![slack_credential()],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events[1].data["tools"][0]["content"], "send_message -> #general");
    // A tool-reported failure reaches the model instead of aborting.
    assert_eq!(events[2].data["tools"][0]["is_error"], true);
    assert!(model.history(2).last().unwrap().content.contains("channel_not_found"));

    assert_eq!(h.counters.connects.load(Ordering::SeqCst), 2);
    assert_eq!(h.counters.disconnects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_tool_server_fails_the_execution() {
    let model = ScriptedModel::new(vec![ModelTurn::tools(vec![ToolCallRequest::new(
        "s1",
        "slack_send_message",
        json!({"channel": "#general", "message": "hi"}),
    )])]);
    let h = harness(model.clone(), settings(5), false);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = h
        .engine
        .run(
            &workflow(vec![NodeInstance::new("notify", "slack_send_message")]),
            json!("announce"),
            vec![slack_credential()],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::ExecutionFailed);
    assert!(err.message.contains("connection refused"));
    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
    assert_eq!(events[1].data["error_type"], "EXECUTION_FAILED");
    assert_eq!(model.calls(), 1);
    assert_eq!(h.counters.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_failure_is_execution_failed() {
    let h = harness(Arc::new(BrokenModel), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = h
        .engine
        .run(&workflow(vec![]), json!("x"), vec![], &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::ExecutionFailed);
    assert!(err.message.contains("upstream exploded"));
    assert_eq!(
        kinds(&drain(&mut rx)),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_times_out() {
    let settings = EngineSettings {
        execution_timeout_secs: Some(2),
        ..settings(5)
    };
    let h = harness(Arc::new(StalledModel { cancel: None }), settings, true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = h
        .engine
        .run(&workflow(vec![]), json!("x"), vec![], &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::Timeout);
    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
    assert_eq!(events[1].data["error_type"], "TIMEOUT");
}

#[tokio::test]
async fn cancellation_interrupts_an_in_flight_turn() {
    let cancel = CancellationToken::new();
    let model = Arc::new(StalledModel {
        cancel: Some(cancel.clone()),
    });
    let h = harness(model, settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        h.engine.run(&workflow(vec![]), json!("x"), vec![], &sink, &cancel),
    )
    .await
    .expect("cancellation should end the run")
    .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::Cancelled);
    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().data["error_type"], "CANCELLED");
    assert_eq!(
        events.iter().filter(|e| e.event_type.is_terminal()).count(),
        1
    );
}

#[tokio::test]
async fn invalid_graph_fails_before_the_first_turn() {
    let model = ScriptedModel::new(vec![]);
    let h = harness(model.clone(), settings(5), true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let graph = WorkflowGraph {
        nodes: vec![
            NodeInstance::new("dup", "calculator"),
            NodeInstance::new("dup", "text_processor"),
        ],
        edges: vec![],
    };
    let err = h
        .engine
        .run(
            &Workflow::new("wf-2", "Broken", graph),
            json!("x"),
            vec![],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::ExecutionFailed);
    assert_eq!(model.calls(), 0);
    assert_eq!(
        kinds(&drain(&mut rx)),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
}

#[tokio::test]
async fn spawned_execution_streams_events() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tools(vec![ToolCallRequest::new(
            "t1",
            "text_processor",
            json!({"text": "shout", "operation": "uppercase"}),
        )]),
        ModelTurn::text("SHOUT"),
    ]);
    let h = harness(model, settings(5), true);

    let (mut events, handle) = h.engine.spawn(
        workflow(vec![NodeInstance::new("text", "text_processor")]),
        json!("make it loud"),
        vec![],
        CancellationToken::new(),
    );

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event.event_type);
    }
    let output = handle.await.unwrap().unwrap();

    assert_eq!(
        seen,
        [
            ExecutionEventType::Start,
            ExecutionEventType::Step,
            ExecutionEventType::Complete,
        ]
    );
    let result: Value = serde_json::from_str(output["result"].as_str().unwrap()).unwrap();
    assert_eq!(result["result"], "SHOUT");
}

fn hanging_slack_turn() -> Arc<ScriptedModel> {
    ScriptedModel::new(vec![ModelTurn::tools(vec![ToolCallRequest::new(
        "s1",
        "slack_send_message",
        json!({"channel": "#hang", "message": "anyone?"}),
    )])])
}

#[tokio::test]
async fn cancellation_during_a_tool_call_closes_the_connection() {
    let cancel = CancellationToken::new();
    let h = build_harness(hanging_slack_turn(), settings(5), true, Some(cancel.clone()));
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        h.engine.run(
            &workflow(vec![NodeInstance::new("notify", "slack_send_message")]),
            json!("announce"),
            vec![slack_credential()],
            &sink,
            &cancel,
        ),
    )
    .await
    .expect("cancellation should end the run")
    .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::Cancelled);
    assert_eq!(h.counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.counters.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(
        kinds(&drain(&mut rx)),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_during_a_tool_call_closes_the_connection() {
    let settings = EngineSettings {
        execution_timeout_secs: Some(2),
        ..settings(5)
    };
    let h = harness(hanging_slack_turn(), settings, true);
    let (sink, mut rx) = ChannelEventSink::channel();

    let err = h
        .engine
        .run(
            &workflow(vec![NodeInstance::new("notify", "slack_send_message")]),
            json!("announce"),
            vec![slack_credential()],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::Timeout);
    assert_eq!(h.counters.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(drain(&mut rx).last().unwrap().data["error_type"], "TIMEOUT");
}

#[tokio::test]
async fn panicking_provider_still_ends_with_one_error_event() {
    let h = harness(Arc::new(PanickingModel), settings(5), true);

    let (mut events, handle) = h.engine.spawn(
        workflow(vec![]),
        json!("x"),
        vec![],
        CancellationToken::new(),
    );

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    let err = handle.await.unwrap().unwrap_err();

    assert_eq!(err.code, ExecutionErrorCode::ExecutionFailed);
    assert!(err.message.contains("provider returned garbage"));
    assert_eq!(
        kinds(&seen),
        [ExecutionEventType::Start, ExecutionEventType::Error]
    );
    assert_eq!(seen[1].data["error_type"], "EXECUTION_FAILED");
}
