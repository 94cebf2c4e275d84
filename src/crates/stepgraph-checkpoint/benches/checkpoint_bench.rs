use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, InMemoryCheckpointSaver, StateData};

fn sample_state() -> StateData {
    let mut state = StateData::new();
    state.insert("messages".to_string(), json!(["a", "b", "c"]));
    state.insert("count".to_string(), json!(3));
    state
}

fn checkpoint_insert_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint insert", |b| {
        b.to_async(&runtime).iter(|| async {
            let saver = InMemoryCheckpointSaver::new();
            let config = CheckpointConfig::new().with_thread_id("bench-thread".to_string());
            let checkpoint = Checkpoint::new("a", "b", sample_state());

            saver.insert(&config, black_box(checkpoint)).await.unwrap();
        });
    });
}

fn checkpoint_load_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = InMemoryCheckpointSaver::new();
    let config = CheckpointConfig::new().with_thread_id("bench-thread".to_string());

    runtime.block_on(async {
        for _ in 0..100 {
            saver
                .insert(&config, Checkpoint::new("a", "b", sample_state()))
                .await
                .unwrap();
        }
    });

    c.bench_function("checkpoint load latest", |b| {
        b.to_async(&runtime).iter(|| async {
            saver.get(black_box(&config)).await.unwrap();
        });
    });
}

criterion_group!(benches, checkpoint_insert_benchmark, checkpoint_load_benchmark);
criterion_main!(benches);
