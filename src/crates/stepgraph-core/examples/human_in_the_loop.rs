//! Human-in-the-loop example
//!
//! The graph suspends before `publish`, a reviewer edits the checkpointed
//! state, and the run resumes where it stopped.

use std::sync::Arc;
use stepgraph_core::{
    CompileConfig, Delta, GraphInput, InMemoryCheckpointSaver, RunConfig, Schema, StateGraph, END,
    START,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    println!("=== Human-in-the-Loop Example ===\n");

    let mut graph = StateGraph::new(Schema::new());
    graph
        .add_node("draft", |_state, _config| async {
            Ok(Delta::new().set("text", "Helo wrold"))
        })
        .add_node("publish", |state, _config| async move {
            let text = state.value::<String>("text").unwrap_or_default();
            println!("  publishing: {text}");
            Ok(Delta::new().set("published", true))
        })
        .add_edge(START, "draft")
        .add_edge("draft", "publish")
        .add_edge("publish", END);

    let compiled = graph.compile_with(
        CompileConfig::new()
            .with_checkpoint_saver(Arc::new(InMemoryCheckpointSaver::new()))
            .interrupt_before(vec!["publish".to_string()]),
    )?;

    let config = RunConfig::new().with_thread_id("article-42");
    let first = compiled.invoke(GraphInput::default(), config.clone()).await?;
    if let Some(interruption) = first.interruption() {
        println!(
            "Suspended before '{}' with text {:?}",
            interruption.node_id,
            interruption.state.value::<String>("text")
        );
    }

    compiled
        .update_state(&config, Delta::new().set("text", "Hello world"), None)
        .await?;
    println!("Reviewer corrected the draft");

    let done = compiled.invoke(GraphInput::resume(), config.clone()).await?;
    println!("\nCompleted: {}", done.is_completed());

    println!("\nHistory (most recent first):");
    for snapshot in compiled.get_state_history(&config).await? {
        println!(
            "  {:>10} -> {:<10} source={}",
            snapshot.node,
            snapshot.next,
            snapshot.metadata.get("source").cloned().unwrap_or_default()
        );
    }

    Ok(())
}
