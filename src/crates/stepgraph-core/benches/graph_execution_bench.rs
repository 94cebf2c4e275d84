use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use stepgraph_core::{
    Channel, CompileConfig, CompiledGraph, Delta, GraphInput, InMemoryCheckpointSaver, RunConfig,
    Schema, StateGraph, END, START,
};

fn linear_graph(len: usize, config: CompileConfig) -> CompiledGraph {
    let mut graph = StateGraph::new(Schema::new().with_channel("count", Channel::counter()));
    let mut previous = START.to_string();
    for i in 0..len {
        let id = format!("node_{i}");
        graph
            .add_node(id.clone(), |_state, _config| async { Ok(Delta::new().set("count", 1)) })
            .add_edge(previous, id.clone());
        previous = id;
    }
    graph.add_edge(previous, END);
    graph.compile_with(config.with_max_iterations(len + 1)).unwrap()
}

fn invoke_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let graph = linear_graph(10, CompileConfig::new());

    c.bench_function("invoke 10 nodes", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = graph
                .invoke(GraphInput::default(), RunConfig::new())
                .await
                .unwrap();
            black_box(result);
        });
    });
}

fn checkpointed_invoke_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let graph = linear_graph(
        10,
        CompileConfig::new()
            .with_checkpoint_saver(saver)
            .with_release_thread(true),
    );

    c.bench_function("invoke 10 nodes with checkpoints", |b| {
        b.to_async(&runtime).iter(|| async {
            let config = RunConfig::new().with_thread_id("bench");
            let result = graph.invoke(GraphInput::default(), config).await.unwrap();
            black_box(result);
        });
    });
}

criterion_group!(benches, invoke_benchmark, checkpointed_invoke_benchmark);
criterion_main!(benches);
