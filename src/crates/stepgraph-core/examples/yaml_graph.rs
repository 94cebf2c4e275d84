//! YAML graph example
//!
//! Loads a graph definition from YAML and resolves its actions and routers
//! against an `ActionRegistry`.

use stepgraph_core::{ActionRegistry, Delta, GraphInput, RunConfig, YamlGraphDef};

const TRIAGE: &str = r#"
name: triage
description: Route support tickets by priority

channels:
  handled_by:
    reducer: append
    default: []

nodes:
  - id: classify
    action: classify
  - id: escalate
    action: escalate
  - id: queue
    action: queue

edges:
  - from: __start__
    to: classify
  - from: classify
    router: by_priority
    targets:
      high: escalate
      low: queue
  - from: escalate
    to: __end__
  - from: queue
    to: __end__
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    println!("=== YAML Graph Example ===\n");

    let mut registry = ActionRegistry::new();
    registry
        .register_node("classify", |state, _config| async move {
            let text = state.value::<String>("ticket").unwrap_or_default();
            let priority = if text.contains("outage") { "high" } else { "low" };
            Ok(Delta::new()
                .set("priority", priority)
                .set("handled_by", "classifier"))
        })
        .register_node("escalate", |_state, _config| async {
            Ok(Delta::new().set("handled_by", "on-call"))
        })
        .register_node("queue", |_state, _config| async {
            Ok(Delta::new().set("handled_by", "support queue"))
        })
        .register_router("by_priority", |state, _config| async move {
            Ok(state.value::<String>("priority").unwrap_or_default())
        });

    let def = YamlGraphDef::from_str(TRIAGE)?;
    let compiled = def.compile(&registry, None)?;

    for ticket in ["Full outage in eu-west", "Typo on pricing page"] {
        let input = GraphInput::args(Delta::new().set("ticket", ticket));
        let result = compiled.invoke(input, RunConfig::new()).await?;
        let handled_by = result
            .state()
            .and_then(|s| s.value::<Vec<String>>("handled_by"))
            .unwrap_or_default();
        println!("  {ticket:<28} -> {}", handled_by.join(" -> "));
    }

    Ok(())
}
