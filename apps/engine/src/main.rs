//! Binary entry point for the Engine service (C6): drains the
//! `execute-workflow` queue with [`flowcore_engine::Worker`], recovering any
//! executions a prior instance left `Running` before it starts taking new
//! work (§4.6.4).
//!
//! Like `apps/orchestrator`, this binary owns its own in-memory state store
//! and queue — it demonstrates the service's wiring, not a shared backend.
//! `--seed-workflow` lets a single process exercise the whole path (submit
//! -> drain -> inspect) without a second process to publish onto its queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use flowcore_core::TenantId;
use flowcore_dispatcher::{Dispatcher, DispatcherConfig, SandboxTransport};
use flowcore_engine::{recover_running, EngineConfig, InMemoryWorkflowCache, Scheduler, Worker};
use flowcore_eventstream::EventStream;
use flowcore_execution::InMemoryStateStore;
use flowcore_sandbox::{FnHandler, NodeRegistry, SandboxConfig, SandboxRunner};
use flowcore_transport::{ExecuteWorkflow, InMemoryQueue, Queue, TransportConfig, WorkflowPayload};
use flowcore_workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowcore-engine", about = "Drain the execute-workflow queue")]
struct Cli {
    /// Optional TOML config file layered under defaults and `FLOWCORE_ENGINE_*` env vars.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed the queue with one workflow at startup so this process has
    /// something to drain on its own.
    #[arg(long)]
    seed_workflow: Option<PathBuf>,
    /// Stop after the queue goes idle instead of serving forever.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    engine: EngineConfig,
    sandbox: SandboxConfig,
    transport: TransportConfig,
    poll_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            sandbox: SandboxConfig::default(),
            transport: TransportConfig::default(),
            poll_timeout_ms: 250,
        }
    }
}

fn load_settings(config: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(path) = config {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("FLOWCORE_ENGINE_").split("_"));
    Ok(figment.extract()?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A couple of demo node types so `--seed-workflow` has something runnable
/// to dispatch to without requiring a separate Node Runner process.
fn demo_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("echo", Arc::new(FnHandler(|_params, input| async move { Ok(input) })));
    registry.register("noop", Arc::new(FnHandler(|_params, _input| async move { Ok(serde_json::json!({})) })));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;

    let state_store = Arc::new(InMemoryStateStore::new());
    let workflow_queue = Arc::new(InMemoryQueue::for_workflow_queue(&settings.transport));
    let events = Arc::new(EventStream::default());
    let runner = SandboxRunner::new(demo_registry(), settings.sandbox.clone());
    let transport = Arc::new(SandboxTransport::new(runner));
    let dispatcher = Arc::new(Dispatcher::new(transport, DispatcherConfig::default()));
    let scheduler = Arc::new(Scheduler::new(
        state_store.clone(),
        dispatcher,
        events.clone(),
        settings.engine.clone().clamped(),
    ));
    let workflow_cache = Arc::new(InMemoryWorkflowCache::new());
    let worker = Worker::new(scheduler.clone(), state_store.clone(), workflow_queue.clone())
        .with_workflow_cache(workflow_cache.clone());

    let resumed = recover_running(&scheduler, &state_store, workflow_cache.as_ref()).await;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "recovered executions left running by a prior instance");
    }

    if let Some(path) = cli.seed_workflow {
        seed(&state_store, &workflow_queue, &path).await?;
    }

    let poll_timeout = Duration::from_millis(settings.poll_timeout_ms);
    if cli.once {
        let handled = worker.run_until_idle(poll_timeout).await;
        info!(handled, "queue drained, exiting (--once)");
        return Ok(());
    }

    info!("engine serving, ctrl-c to stop");
    tokio::select! {
        _ = async {
            loop {
                worker.run_one(poll_timeout).await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

async fn seed(
    state_store: &Arc<InMemoryStateStore>,
    queue: &InMemoryQueue,
    workflow_path: &PathBuf,
) -> anyhow::Result<()> {
    use flowcore_execution::{Execution, StateStore};

    let workflow: WorkflowDefinition = serde_json::from_str(&std::fs::read_to_string(workflow_path)?)?;
    let execution_id = flowcore_core::ExecutionId::v4();
    let tenant_id = TenantId::v4();
    state_store.create(Execution::new(
        execution_id,
        workflow.id,
        tenant_id,
        serde_json::json!({}),
        execution_id.to_string(),
    ))?;

    let job = ExecuteWorkflow {
        execution_id,
        workflow_id: workflow.id,
        workflow: WorkflowPayload {
            id: workflow.id,
            nodes: serde_json::to_value(&workflow.nodes)?,
            edges: serde_json::to_value(&workflow.edges)?,
        },
        input: serde_json::json!({}),
        metadata: serde_json::json!({}),
        tenant_id,
        user_id: None,
        correlation_id: execution_id.to_string(),
    };
    queue.publish(serde_json::to_value(&job)?).await?;
    info!(%execution_id, "seeded one execute-workflow job");
    Ok(())
}
