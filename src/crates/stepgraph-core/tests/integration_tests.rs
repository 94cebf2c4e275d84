//! Integration tests for complete workflows
//!
//! These tests drive the public API end to end: hooks, nested graphs,
//! human-in-the-loop resumption, state editing and YAML definitions.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use stepgraph_core::hook::{Action, AfterHook, BeforeHook, WrapHook};
use stepgraph_core::{
    ActionRegistry, Channel, Checkpoint, CheckpointConfig, CheckpointError, CheckpointSaver,
    Command, CompileConfig, CompiledGraph, Delta, GraphError, GraphEvent, GraphInput, GraphPath,
    InMemoryCheckpointSaver, InterruptKind, Result, RunConfig, Schema, State, StateGraph,
    SubgraphConfig, SubgraphNode, Tag, YamlGraphDef, END, START,
};

fn trail_schema() -> Schema {
    Schema::new().with_channel("trail", Channel::appender())
}

/// Add a node that appends its own id to `trail`
fn step(graph: &mut StateGraph, id: &'static str) {
    graph.add_node(id, move |_state, _config| async move {
        Ok(Delta::new().set("trail", id))
    });
}

/// `START -> ids[0] -> ... -> END`
fn chain(graph: &mut StateGraph, ids: &[&'static str]) {
    let mut previous = START;
    for &id in ids {
        step(graph, id);
        graph.add_edge(previous, id);
        previous = id;
    }
    graph.add_edge(previous, END);
}

fn trail(state: Option<&State>) -> Vec<String> {
    state
        .and_then(|s| s.value::<Vec<String>>("trail"))
        .unwrap_or_default()
}

fn with_saver(saver: &Arc<InMemoryCheckpointSaver>) -> CompileConfig {
    CompileConfig::new().with_checkpoint_saver(saver.clone())
}

async fn events(graph: &CompiledGraph, input: GraphInput, config: RunConfig) -> Vec<GraphEvent> {
    graph.stream(input, config).collect().await
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
        })
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{event}:{}", self.name));
    }
}

#[async_trait]
impl BeforeHook for Recorder {
    async fn before(&self, _id: &str, _state: &State, _config: &RunConfig) -> Result<Delta> {
        self.record("before");
        Ok(Delta::new())
    }
}

#[async_trait]
impl WrapHook<Delta> for Recorder {
    async fn wrap(
        &self,
        _id: &str,
        state: State,
        config: RunConfig,
        next: Action<Delta>,
    ) -> Result<Delta> {
        self.record("enter");
        let delta = next(state, config).await?;
        self.record("exit");
        Ok(delta)
    }
}

#[async_trait]
impl AfterHook<Delta> for Recorder {
    async fn after(&self, _id: &str, _state: &State, _config: &RunConfig, result: Delta) -> Result<Delta> {
        self.record("after");
        Ok(result)
    }
}

#[tokio::test]
async fn test_node_hook_invocation_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut graph = StateGraph::new(Schema::new());
    let action_log = log.clone();
    graph
        .add_node("work", move |_state, _config| {
            let log = action_log.clone();
            async move {
                log.lock().push("action".to_string());
                Ok(Delta::new())
            }
        })
        .add_edge(START, "work")
        .add_edge("work", END)
        .add_node_before_hook(Recorder::new("g1", &log))
        .add_node_before_hook(Recorder::new("g2", &log))
        .add_node_before_hook_for("work", Recorder::new("s1", &log))
        .add_node_wrap_hook(Recorder::new("w1", &log))
        .add_node_wrap_hook_for("work", Recorder::new("w2", &log))
        .add_node_after_hook(Recorder::new("a1", &log))
        .add_node_after_hook(Recorder::new("a2", &log));

    let result = graph
        .compile()
        .unwrap()
        .invoke(GraphInput::default(), RunConfig::new())
        .await
        .unwrap();
    assert!(result.is_completed());

    assert_eq!(
        *log.lock(),
        vec![
            "before:g2", "before:g1", "before:s1", "enter:w1", "enter:w2", "action", "exit:w2",
            "exit:w1", "after:a2", "after:a1",
        ]
    );
}

struct Stamp;

#[async_trait]
impl BeforeHook for Stamp {
    async fn before(&self, id: &str, _state: &State, _config: &RunConfig) -> Result<Delta> {
        Ok(Delta::new().set("stamped", id.to_string()))
    }
}

#[async_trait]
impl AfterHook<Delta> for Stamp {
    async fn after(&self, _id: &str, _state: &State, _config: &RunConfig, result: Delta) -> Result<Delta> {
        Ok(result.set("audited", true))
    }
}

#[tokio::test]
async fn test_hook_deltas_reach_action_and_state() {
    let mut graph = StateGraph::new(Schema::new());
    graph
        .add_node("copy", |state, _config| async move {
            let stamped = state.value::<String>("stamped").unwrap_or_default();
            Ok(Delta::new().set("copied", stamped))
        })
        .add_edge(START, "copy")
        .add_edge("copy", END)
        .add_node_before_hook(Arc::new(Stamp))
        .add_node_after_hook_for("copy", Arc::new(Stamp));

    let result = graph
        .compile()
        .unwrap()
        .invoke(GraphInput::default(), RunConfig::new())
        .await
        .unwrap();
    let state = result.state().unwrap();
    assert_eq!(state.value::<String>("stamped").as_deref(), Some("copy"));
    assert_eq!(state.value::<String>("copied").as_deref(), Some("copy"));
    assert_eq!(state.value::<bool>("audited"), Some(true));
}

struct Redirect(&'static str);

#[async_trait]
impl WrapHook<Command> for Redirect {
    async fn wrap(
        &self,
        _id: &str,
        state: State,
        config: RunConfig,
        next: Action<Command>,
    ) -> Result<Command> {
        let command = next(state, config).await?;
        Ok(Command::goto(self.0).with_update(command.update))
    }
}

#[tokio::test]
async fn test_edge_wrap_hook_rewrites_route() {
    let mut graph = StateGraph::new(trail_schema());
    step(&mut graph, "a");
    step(&mut graph, "b");
    step(&mut graph, "c");
    graph
        .add_edge(START, "a")
        .add_conditional_edges(
            "a",
            |_state, _config| async { Ok("c".to_string()) },
            [("b", "b"), ("c", "c")],
        )
        .add_edge("b", END)
        .add_edge("c", END)
        .add_edge_wrap_hook_for("a", Arc::new(Redirect("b")));

    let result = graph
        .compile()
        .unwrap()
        .invoke(GraphInput::default(), RunConfig::new())
        .await
        .unwrap();
    assert_eq!(trail(result.state()), vec!["a", "b"]);
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

#[test]
fn test_compile_rejects_malformed_graphs() {
    let mut dangling = StateGraph::new(Schema::new());
    step(&mut dangling, "a");
    dangling.add_edge(START, "a").add_edge("a", "ghost");
    assert!(dangling.compile().unwrap_err().is_validation());

    let mut dead_end = StateGraph::new(Schema::new());
    step(&mut dead_end, "a");
    step(&mut dead_end, "b");
    dead_end.add_edge(START, "a").add_edge("a", END).add_edge("b", END);
    assert!(dead_end.compile().is_err());

    let mut no_entry = StateGraph::new(Schema::new());
    step(&mut no_entry, "a");
    no_entry.add_edge("a", END);
    assert!(no_entry.compile().unwrap_err().is_validation());

    let mut split_join = StateGraph::new(Schema::new());
    for id in ["b1", "b2", "j1", "j2"] {
        step(&mut split_join, id);
    }
    split_join
        .add_edge(START, "b1")
        .add_edge(START, "b2")
        .add_edge("b1", "j1")
        .add_edge("b2", "j2")
        .add_edge("j1", END)
        .add_edge("j2", END);
    assert!(split_join.compile().unwrap_err().is_validation());
}

#[test]
fn test_compile_rejects_unknown_interrupt_and_hook_targets() {
    let mut graph = StateGraph::new(Schema::new());
    chain(&mut graph, &["a"]);

    let err = graph
        .clone()
        .compile_with(CompileConfig::new().interrupt_before(vec!["ghost".to_string()]))
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));

    graph.add_node_before_hook_for("ghost", Arc::new(Stamp));
    assert!(graph.compile().is_err());
}

// ---------------------------------------------------------------------------
// Human in the loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_interrupt_after_round_trip() {
    let build = || {
        let mut graph = StateGraph::new(trail_schema());
        chain(&mut graph, &["a", "b", "c", "d"]);
        graph
    };
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let uninterrupted = build()
        .compile()
        .unwrap()
        .invoke(GraphInput::args(Delta::new().set("topic", "rust")), RunConfig::new())
        .await
        .unwrap();
    let compiled = build()
        .compile_with(with_saver(&saver).interrupt_after(vec!["b".to_string()]))
        .unwrap();

    let config = RunConfig::new().with_thread_id("review-1");
    let first = compiled
        .invoke(GraphInput::args(Delta::new().set("topic", "rust")), config.clone())
        .await
        .unwrap();
    let interruption = first.interruption().unwrap();
    assert_eq!(interruption.kind, InterruptKind::After);
    assert_eq!(interruption.node_id, "c");
    assert_eq!(interruption.metadata["after"], json!("b"));
    assert_eq!(trail(first.state()), vec!["a", "b"]);

    let pending = compiled.get_state(&config).await.unwrap().unwrap();
    assert_eq!(pending.node, "b");
    assert_eq!(pending.next, "c");

    let done = compiled.invoke(GraphInput::resume(), config).await.unwrap();
    assert!(done.is_completed());
    assert_eq!(done.state(), uninterrupted.state());
}

#[tokio::test]
async fn test_failed_checkpoint_write_stops_the_run() {
    let saver = Arc::new(FailingSaver::after_inserts(1));
    let ran = Arc::new(Mutex::new(Vec::new()));
    let mut graph = StateGraph::new(trail_schema());
    for id in ["a", "b"] {
        let ran = ran.clone();
        graph.add_node(id, move |_state, _config| {
            ran.lock().push(id);
            async move { Ok(Delta::new().set("trail", id)) }
        });
    }
    graph
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("b", END);
    let compiled = graph
        .compile_with(CompileConfig::new().with_checkpoint_saver(saver.clone()))
        .unwrap();
    let config = RunConfig::new().with_thread_id("full-disk");

    let mut stream = compiled.stream(GraphInput::default(), config.clone());
    let mut emitted = Vec::new();
    while let Some(event) = stream.next().await {
        emitted.push(event);
    }
    let result = stream.take_result().unwrap();
    assert!(matches!(
        result,
        Err(GraphError::Checkpoint(CheckpointError::Storage(ref message))) if message == "disk full"
    ));
    assert!(emitted.is_empty());
    assert_eq!(*ran.lock(), vec!["a"]);

    // The persisted history still ends at the last successful write.
    let latest = compiled.get_state(&config).await.unwrap().unwrap();
    assert_eq!(latest.node, START);
    assert_eq!(latest.next, "a");
}

/// Saver whose inserts fail once `limit` have succeeded
struct FailingSaver {
    inner: InMemoryCheckpointSaver,
    limit: usize,
    inserts: Mutex<usize>,
}

impl FailingSaver {
    fn after_inserts(limit: usize) -> Self {
        Self {
            inner: InMemoryCheckpointSaver::new(),
            limit,
            inserts: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CheckpointSaver for FailingSaver {
    async fn load(&self, config: &CheckpointConfig) -> std::result::Result<Vec<Checkpoint>, CheckpointError> {
        self.inner.load(config).await
    }

    async fn insert(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
    ) -> std::result::Result<CheckpointConfig, CheckpointError> {
        {
            let mut inserts = self.inserts.lock();
            if *inserts >= self.limit {
                return Err(CheckpointError::Storage("disk full".to_string()));
            }
            *inserts += 1;
        }
        self.inner.insert(config, checkpoint).await
    }

    async fn update(
        &self,
        config: &CheckpointConfig,
        checkpoint_id: &str,
        checkpoint: Checkpoint,
    ) -> std::result::Result<CheckpointConfig, CheckpointError> {
        self.inner.update(config, checkpoint_id, checkpoint).await
    }

    async fn release(&self, config: &CheckpointConfig) -> std::result::Result<Tag, CheckpointError> {
        self.inner.release(config).await
    }
}

#[tokio::test]
async fn test_update_state_as_node_reroutes() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut graph = StateGraph::new(trail_schema());
    for id in ["one", "two", "three"] {
        step(&mut graph, id);
    }
    graph
        .add_edge(START, "one")
        .add_conditional_edges(
            "one",
            |state, _config| async move {
                let skip = state.value::<bool>("skip").unwrap_or(false);
                Ok(if skip { "skip" } else { "next" }.to_string())
            },
            [("next", "two"), ("skip", "three")],
        )
        .add_edge("two", "three")
        .add_edge("three", END);
    let compiled = graph
        .compile_with(with_saver(&saver).interrupt_after(vec!["one".to_string()]))
        .unwrap();

    let config = RunConfig::new().with_thread_id("reroute");
    let first = compiled
        .invoke(GraphInput::default(), config.clone())
        .await
        .unwrap();
    assert_eq!(first.interruption().unwrap().node_id, "two");

    // Without as_node the pending node is kept.
    compiled
        .update_state(&config, Delta::new().set("skip", true), None)
        .await
        .unwrap();
    assert_eq!(compiled.get_state(&config).await.unwrap().unwrap().next, "two");

    compiled
        .update_state(&config, Delta::new(), Some("one"))
        .await
        .unwrap();
    let snapshot = compiled.get_state(&config).await.unwrap().unwrap();
    assert_eq!(snapshot.node, "one");
    assert_eq!(snapshot.next, "three");

    let done = compiled.invoke(GraphInput::resume(), config).await.unwrap();
    assert_eq!(trail(done.state()), vec!["one", "three"]);
}

#[tokio::test]
async fn test_cancelled_run_resumes_from_last_checkpoint() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut graph = StateGraph::new(trail_schema());
    chain(&mut graph, &["a", "b", "c"]);
    let compiled = graph.compile_with(with_saver(&saver)).unwrap();
    let config = RunConfig::new().with_thread_id("cancel");

    let mut stream = compiled.stream(GraphInput::default(), config.clone());
    while let Some(event) = stream.next().await {
        if event.node() == "a" {
            stream.cancel();
        }
    }
    let result = stream.take_result().unwrap().unwrap();
    assert!(result.is_cancelled());

    let checkpoint = compiled.get_state(&config).await.unwrap().unwrap();
    assert_eq!(Some(&checkpoint.state), result.state());
    assert_eq!(checkpoint.next, "b");

    let done = compiled.invoke(GraphInput::resume(), config).await.unwrap();
    assert_eq!(trail(done.state()), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_threads_run_concurrently_on_one_graph() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut graph = StateGraph::new(Schema::new().with_channel("total", Channel::counter()));
    graph
        .add_node("add", |state, _config| async move {
            let n = state.value::<i64>("n").unwrap_or(0);
            tokio::task::yield_now().await;
            Ok(Delta::new().set("total", n))
        })
        .add_edge(START, "add")
        .add_edge("add", END);
    let compiled = graph.compile_with(with_saver(&saver)).unwrap();

    let runs = (1..=8).map(|n| {
        let compiled = compiled.clone();
        tokio::spawn(async move {
            let config = RunConfig::new().with_thread_id(format!("thread-{n}"));
            compiled
                .invoke(GraphInput::args(Delta::new().set("n", n)), config)
                .await
        })
    });
    let results = futures::future::join_all(runs).await;

    for (n, result) in (1..=8).zip(results) {
        let result = result.unwrap().unwrap();
        assert_eq!(result.state().unwrap().value::<i64>("total"), Some(n));
    }
}

// ---------------------------------------------------------------------------
// Subgraphs
// ---------------------------------------------------------------------------

fn draft_child(saver: &Arc<InMemoryCheckpointSaver>, interrupt: bool) -> CompiledGraph {
    let mut child = StateGraph::new(trail_schema());
    step(&mut child, "draft");
    child
        .add_node("approve", |state, _config| async move {
            let approved = state.value::<bool>("approved").unwrap_or(false);
            Ok(Delta::new()
                .set("trail", "approve")
                .set("status", if approved { "approved" } else { "rejected" }))
        })
        .add_edge(START, "draft")
        .add_edge("draft", "approve")
        .add_edge("approve", END);

    let mut config = with_saver(saver);
    if interrupt {
        config = config.interrupt_before(vec!["approve".to_string()]);
    }
    child.compile_with(config).unwrap()
}

#[tokio::test]
async fn test_subgraph_history_is_isolated() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut parent = StateGraph::new(trail_schema());
    step(&mut parent, "prepare");
    step(&mut parent, "publish");
    parent
        .add_subgraph("review", draft_child(&saver, false))
        .add_edge(START, "prepare")
        .add_edge("prepare", "review")
        .add_edge("review", "publish")
        .add_edge("publish", END);
    let compiled = parent.compile_with(with_saver(&saver)).unwrap();

    let config = RunConfig::new().with_thread_id("isolated");
    let all = events(&compiled, GraphInput::default(), config.clone()).await;

    let review_path = GraphPath::of(["review"]).unwrap();
    let nested: Vec<&str> = all
        .iter()
        .filter(|e| e.path() == &review_path)
        .map(GraphEvent::node)
        .collect();
    assert_eq!(nested, vec!["draft", "approve", END]);
    let root: Vec<&str> = all
        .iter()
        .filter(|e| e.path().is_empty())
        .map(GraphEvent::node)
        .collect();
    assert_eq!(root, vec!["prepare", "review", "publish", END]);

    let final_state = all.last().and_then(GraphEvent::state);
    assert_eq!(trail(final_state), vec!["prepare", "draft", "approve", "publish"]);

    let parent_history: Vec<String> = compiled
        .get_state_history(&config)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.node)
        .collect();
    assert_eq!(parent_history, vec!["publish", "review", "prepare", START]);

    let child_config = config.clone().with_graph_path(review_path);
    let child = compiled.subgraph("review").unwrap().clone();
    let child_latest = child.get_state(&child_config).await.unwrap().unwrap();
    assert_eq!(child_latest.node, "approve");
    assert_eq!(child_latest.next, END);
}

#[tokio::test]
async fn test_subgraph_deletions_do_not_leak_into_parent() {
    let mut child = StateGraph::new(Schema::new());
    child
        .add_node("cleanup", |_state, _config| async {
            Ok(Delta::new().remove("scratch").set("done", true))
        })
        .add_edge(START, "cleanup")
        .add_edge("cleanup", END);

    let mut parent = StateGraph::new(Schema::new());
    parent
        .add_node("prepare", |_state, _config| async {
            Ok(Delta::new().set("scratch", "keep me"))
        })
        .add_subgraph("clean", child.compile().unwrap())
        .add_edge(START, "prepare")
        .add_edge("prepare", "clean")
        .add_edge("clean", END);

    let result = parent
        .compile()
        .unwrap()
        .invoke(GraphInput::default(), RunConfig::new())
        .await
        .unwrap();
    let state = result.state().unwrap();
    assert_eq!(state.value::<String>("scratch").as_deref(), Some("keep me"));
    assert_eq!(state.value::<bool>("done"), Some(true));
}

#[tokio::test]
async fn test_subgraph_suspension_resumes_child() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut parent = StateGraph::new(trail_schema());
    step(&mut parent, "prepare");
    step(&mut parent, "publish");
    parent
        .add_subgraph_with(
            "review",
            draft_child(&saver, true),
            SubgraphConfig::new().with_output_keys(["trail", "status"]),
        )
        .add_edge(START, "prepare")
        .add_edge("prepare", "review")
        .add_edge("review", "publish")
        .add_edge("publish", END);
    let compiled = parent.compile_with(with_saver(&saver)).unwrap();
    let config = RunConfig::new().with_thread_id("nested-hitl");

    let first = compiled
        .invoke(GraphInput::default(), config.clone())
        .await
        .unwrap();
    let interruption = first.interruption().unwrap();
    assert_eq!(interruption.kind, InterruptKind::Subgraph);
    assert_eq!(interruption.node_id, "review");
    let inner = interruption.innermost();
    assert_eq!(inner.kind, InterruptKind::Before);
    assert_eq!(inner.node_id, "approve");

    let done = compiled
        .invoke(
            GraphInput::resume_with(Delta::new().set("approved", true)),
            config,
        )
        .await
        .unwrap();
    let state = done.state().unwrap();
    assert_eq!(state.value::<String>("status").as_deref(), Some("approved"));
    assert_eq!(trail(Some(state)), vec!["prepare", "draft", "approve", "publish"]);
}

#[tokio::test]
async fn test_fresh_run_ignores_abandoned_child_history() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut parent = StateGraph::new(trail_schema());
    step(&mut parent, "prepare");
    step(&mut parent, "publish");
    parent
        .add_subgraph("review", draft_child(&saver, true))
        .add_edge(START, "prepare")
        .add_edge("prepare", "review")
        .add_edge("review", "publish")
        .add_edge("publish", END);
    let compiled = parent
        .compile_with(with_saver(&saver).interrupt_after(vec!["prepare".to_string()]))
        .unwrap();
    let config = RunConfig::new().with_thread_id("abandoned");
    let tagged = |tag: &str| GraphInput::args(Delta::new().set("tag", tag));

    // First run stops inside the child and is never resumed.
    let first = compiled.invoke(tagged("one"), config.clone()).await.unwrap();
    assert_eq!(first.interruption().unwrap().kind, InterruptKind::After);
    let first = compiled.invoke(GraphInput::resume(), config.clone()).await.unwrap();
    assert_eq!(first.interruption().unwrap().kind, InterruptKind::Subgraph);

    let second = compiled.invoke(tagged("two"), config.clone()).await.unwrap();
    let interruption = second.interruption().unwrap();
    assert_eq!(interruption.kind, InterruptKind::After);
    assert_eq!(interruption.node_id, "review");

    // The child starts over instead of picking up the first run's history.
    let second = compiled.invoke(GraphInput::resume(), config.clone()).await.unwrap();
    let interruption = second.interruption().unwrap();
    assert_eq!(interruption.kind, InterruptKind::Subgraph);
    assert_eq!(interruption.innermost().node_id, "approve");
    assert_eq!(
        interruption.innermost().state.value::<String>("tag").as_deref(),
        Some("two")
    );

    let done = compiled
        .invoke(
            GraphInput::resume_with(Delta::new().set("approved", true)),
            config,
        )
        .await
        .unwrap();
    let state = done.state().unwrap();
    assert_eq!(state.value::<String>("tag").as_deref(), Some("two"));
    assert_eq!(state.value::<String>("status").as_deref(), Some("approved"));
    assert_eq!(trail(Some(state)), vec!["prepare", "draft", "approve", "publish"]);
}

#[tokio::test]
async fn test_subgraph_resume_survives_state_update() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut parent = StateGraph::new(trail_schema());
    parent
        .add_subgraph("review", draft_child(&saver, true))
        .add_edge(START, "review")
        .add_edge("review", END);
    let compiled = parent.compile_with(with_saver(&saver)).unwrap();
    let config = RunConfig::new().with_thread_id("edited");

    let first = compiled.invoke(GraphInput::default(), config.clone()).await.unwrap();
    assert_eq!(first.interruption().unwrap().kind, InterruptKind::Subgraph);

    let updated = compiled
        .update_state(&config, Delta::new().set("approved", true), None)
        .await
        .unwrap();
    let done = compiled.invoke(GraphInput::resume(), updated).await.unwrap();
    // Resumed child: draft ran once, before the suspension.
    assert_eq!(trail(done.state()), vec!["draft", "approve"]);
}

#[tokio::test]
async fn test_action_handles_subgraph_suspension_itself() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let sub = Arc::new(SubgraphNode::new(
        draft_child(&saver, true),
        SubgraphConfig::new(),
    ));

    let mut parent = StateGraph::new(trail_schema());
    parent
        .add_node("delegate", move |state, config| {
            let sub = sub.clone();
            async move {
                match sub.run("delegate", state, config).await {
                    Ok(delta) => Ok(delta),
                    Err(GraphError::SubgraphInterrupted(pending)) => {
                        Ok(Delta::new().set("pending", pending.resume_node().to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .add_edge(START, "delegate")
        .add_edge("delegate", END);
    let compiled = parent.compile_with(with_saver(&saver)).unwrap();

    let result = compiled
        .invoke(GraphInput::default(), RunConfig::new().with_thread_id("manual"))
        .await
        .unwrap();
    assert!(result.is_completed());
    assert_eq!(
        result.state().unwrap().value::<String>("pending").as_deref(),
        Some("approve")
    );
}

#[tokio::test]
async fn test_graph_id_prefixes_nested_paths() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut child = StateGraph::new(Schema::new());
    child
        .add_node("emit", |_state, config: RunConfig| async move {
            config.emit(json!({"token": "hi"}));
            Ok(Delta::new().set("said", "hi"))
        })
        .add_edge(START, "emit")
        .add_edge("emit", END);

    let mut parent = StateGraph::new(Schema::new());
    parent
        .add_subgraph("inner", child.compile_with(with_saver(&saver)).unwrap())
        .add_edge(START, "inner")
        .add_edge("inner", END);
    let compiled = parent
        .compile_with(with_saver(&saver).with_graph_id("root"))
        .unwrap();

    let config = RunConfig::new().with_thread_id("prefixed");
    let all = events(&compiled, GraphInput::default(), config.clone()).await;

    let chunk = all
        .iter()
        .find_map(|e| match e {
            GraphEvent::Streaming(output) => Some(output),
            _ => None,
        })
        .unwrap();
    assert_eq!(chunk.node, "emit");
    assert_eq!(chunk.path.to_string(), "root/inner");
    assert_eq!(chunk.chunk, json!({"token": "hi"}));

    let nested_path = GraphPath::of(["root", "inner"]).unwrap();
    let nested_config = config.with_graph_path(nested_path);
    let inner = compiled.subgraph("inner").unwrap().clone();
    assert!(inner.get_state(&nested_config).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Parallel branches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_parallel_branches_share_input_state() {
    let schema = trail_schema().with_channel("hits", Channel::counter());
    let mut graph = StateGraph::new(schema);
    step(&mut graph, "split");
    for id in ["left", "right"] {
        graph.add_node(id, move |state, _config| async move {
            let seen = state.value::<Vec<String>>("trail").unwrap_or_default();
            Ok(Delta::new()
                .set("trail", format!("{id} saw {}", seen.len()))
                .set("hits", 1))
        });
    }
    step(&mut graph, "join");
    graph
        .add_edge(START, "split")
        .add_edge("split", "left")
        .add_edge("split", "right")
        .add_edge("left", "join")
        .add_edge("right", "join")
        .add_edge("join", END);

    let result = graph
        .compile()
        .unwrap()
        .invoke(GraphInput::default(), RunConfig::new())
        .await
        .unwrap();
    let state = result.state().unwrap();
    assert_eq!(state.value::<i64>("hits"), Some(2));
    assert_eq!(
        trail(Some(state)),
        vec!["split", "left saw 1", "right saw 1", "join"]
    );
}

// ---------------------------------------------------------------------------
// YAML definitions
// ---------------------------------------------------------------------------

const ONBOARDING: &str = r#"
name: onboarding
channels:
  trail:
    reducer: append
nodes:
  - id: collect
    action: collect
  - id: review
    subgraph: reviewer
    output_keys: [trail, status]
  - id: welcome
    action: welcome
edges:
  - from: __start__
    to: collect
  - from: collect
    to: review
  - from: review
    router: by_status
    targets:
      approved: welcome
      rejected: __end__
  - from: welcome
    to: __end__
"#;

#[tokio::test]
async fn test_yaml_graph_with_registered_subgraph() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut registry = ActionRegistry::new();
    registry
        .register_node("collect", |_state, _config| async {
            Ok(Delta::new().set("trail", "collect"))
        })
        .register_node("welcome", |_state, _config| async {
            Ok(Delta::new().set("trail", "welcome"))
        })
        .register_router("by_status", |state, _config| async move {
            Ok(state.value::<String>("status").unwrap_or_default())
        })
        .register_subgraph("reviewer", draft_child(&saver, true));

    let def = YamlGraphDef::from_str(ONBOARDING).unwrap();
    let compiled = def.compile(&registry, Some(saver.clone())).unwrap();
    let config = RunConfig::new().with_thread_id("yaml");

    let first = compiled
        .invoke(GraphInput::default(), config.clone())
        .await
        .unwrap();
    assert_eq!(first.interruption().unwrap().innermost().node_id, "approve");

    let done = compiled
        .invoke(
            GraphInput::resume_with(Delta::new().set("approved", true)),
            config,
        )
        .await
        .unwrap();
    assert_eq!(
        trail(done.state()),
        vec!["collect", "draft", "approve", "welcome"]
    );
}
