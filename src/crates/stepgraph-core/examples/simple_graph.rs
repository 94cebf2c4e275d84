//! Simple graph example
//!
//! A linear graph whose nodes update a counter and append to a log
//! channel. Run with `RUST_LOG=debug` to see the engine's step logging.

use stepgraph_core::{Channel, Delta, GraphInput, RunConfig, Schema, StateGraph, END, START};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    println!("=== Simple Graph Example ===\n");

    let schema = Schema::new().with_channel("log", Channel::appender());
    let mut graph = StateGraph::new(schema);

    graph
        .add_node("add_ten", |state, _config| async move {
            let value = state.value::<i64>("value").unwrap_or(0);
            Ok(Delta::new()
                .set("value", value + 10)
                .set("log", format!("add_ten: {value} -> {}", value + 10)))
        })
        .add_node("double", |state, _config| async move {
            let value = state.value::<i64>("value").unwrap_or(0);
            Ok(Delta::new()
                .set("value", value * 2)
                .set("log", format!("double: {value} -> {}", value * 2)))
        })
        .add_edge(START, "add_ten")
        .add_edge("add_ten", "double")
        .add_edge("double", END);

    let compiled = graph.compile()?;

    let input = GraphInput::args(Delta::new().set("value", 5));
    let result = compiled.invoke(input, RunConfig::new()).await?;

    if let Some(state) = result.state() {
        for line in state.value::<Vec<String>>("log").unwrap_or_default() {
            println!("  {line}");
        }
        println!("\nExpected: value = (5 + 10) * 2 = 30");
        println!("Actual: value = {}", state.value::<i64>("value").unwrap_or_default());
    }

    Ok(())
}
