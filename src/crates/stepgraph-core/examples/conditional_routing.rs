//! Conditional routing example
//!
//! A router inspects the state and picks the next node by label. The loop
//! retries until the score passes, and the stream shows every step.

use futures::StreamExt;
use stepgraph_core::{
    Channel, Delta, GraphEvent, GraphInput, RunConfig, Schema, StateGraph, END, START,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    println!("=== Conditional Routing Example ===\n");

    let schema = Schema::new()
        .with_channel("attempts", Channel::counter())
        .with_channel("score", Channel::new().with_default_value(0.into()));
    let mut graph = StateGraph::new(schema);

    graph
        .add_node("attempt", |state, config| async move {
            let attempts = state.value::<i64>("attempts").unwrap_or(0) + 1;
            config.emit(format!("attempt #{attempts}"));
            Ok(Delta::new().set("attempts", 1).set("score", attempts * 30))
        })
        .add_node("accept", |_state, _config| async {
            Ok(Delta::new().set("outcome", "accepted"))
        })
        .add_node("give_up", |_state, _config| async {
            Ok(Delta::new().set("outcome", "rejected"))
        })
        .add_edge(START, "attempt")
        .add_conditional_edges(
            "attempt",
            |state, _config| async move {
                let score = state.value::<i64>("score").unwrap_or(0);
                let attempts = state.value::<i64>("attempts").unwrap_or(0);
                let label = match (score, attempts) {
                    (s, _) if s >= 80 => "pass",
                    (_, a) if a >= 5 => "stop",
                    _ => "retry",
                };
                Ok(label.to_string())
            },
            [("pass", "accept"), ("retry", "attempt"), ("stop", "give_up")],
        )
        .add_edge("accept", END)
        .add_edge("give_up", END);

    let compiled = graph.compile()?;

    let mut stream = compiled.stream(GraphInput::default(), RunConfig::new());
    while let Some(event) = stream.next().await {
        match event {
            GraphEvent::Streaming(output) => println!("  [{}] {}", output.node, output.chunk),
            GraphEvent::Node(output) => println!("  -> {}", output.node),
            GraphEvent::Snapshot(_) => {}
        }
    }

    let result = stream
        .take_result()
        .ok_or("stream ended without a result")??;
    if let Some(state) = result.state() {
        println!(
            "\nOutcome: {} after {} attempts",
            state.value::<String>("outcome").unwrap_or_default(),
            state.value::<i64>("attempts").unwrap_or_default()
        );
    }

    Ok(())
}
