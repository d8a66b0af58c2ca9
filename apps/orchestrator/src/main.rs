//! Binary entry point for the Orchestrator service (C7): a thin CLI over
//! [`flowcore_orchestrator::Orchestrator`]'s `submit`/`get_status`/`cancel`
//! surface (§4.7).
//!
//! Each invocation builds its own in-memory state store and queue — this
//! binary demonstrates the service's external contract and wiring, not a
//! shared backend across process boundaries. A real deployment swaps
//! [`flowcore_execution::InMemoryStateStore`] and
//! [`flowcore_transport::InMemoryQueue`] for durable, shared
//! implementations behind the same traits.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flowcore_core::{ExecutionId, TenantId};
use flowcore_eventstream::EventStream;
use flowcore_execution::InMemoryStateStore;
use flowcore_orchestrator::Orchestrator;
use flowcore_transport::{InMemoryQueue, TransportConfig};
use flowcore_workflow::WorkflowDefinition;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowcore-orchestrator", about = "Submit, inspect, and cancel workflow executions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and submit a workflow definition.
    Submit {
        /// Path to a JSON-encoded `WorkflowDefinition`.
        #[arg(long)]
        workflow: PathBuf,
        /// Path to a JSON input value; defaults to `{}`.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        tenant: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Submit { workflow, input, tenant } => submit(workflow, input, tenant).await?,
    }
    Ok(())
}

async fn submit(workflow_path: PathBuf, input_path: Option<PathBuf>, tenant: Option<String>) -> anyhow::Result<()> {
    let workflow: WorkflowDefinition = serde_json::from_str(&std::fs::read_to_string(&workflow_path)?)?;
    let input = match input_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => serde_json::json!({}),
    };
    let tenant_id = match tenant {
        Some(raw) => TenantId::parse(&raw).map_err(|err| anyhow::anyhow!("invalid --tenant: {err}"))?,
        None => TenantId::v4(),
    };

    let state_store = Arc::new(InMemoryStateStore::new());
    let queue = Arc::new(InMemoryQueue::for_workflow_queue(&TransportConfig::default()));
    let events = Arc::new(EventStream::default());
    let orchestrator = Orchestrator::new(state_store.clone(), queue, events);

    let correlation_id = ExecutionId::v4().to_string();
    let execution_id: ExecutionId = orchestrator
        .submit(&workflow, input, tenant_id, serde_json::json!({}), correlation_id)
        .await?;

    let view = orchestrator.get_status(execution_id)?;
    info!(%execution_id, status = %view.execution.status, "workflow submitted");
    println!("{}", serde_json::to_string_pretty(&view.execution)?);
    Ok(())
}
