//! Binary entry point for the Node Runner service (C3): drains the
//! `execute-node` queue, runs each request through [`SandboxRunner`], and
//! publishes an [`ExecuteNodeReply`] for every job it consumes (§4.3, §6).
//!
//! A real deployment has a Dispatcher on the other end of `execute-node`
//! and a reply-to queue keyed by `correlation_id`. This binary owns both
//! queues itself, so `--seed-node` is what makes it demonstrable alone:
//! it publishes one `ExecuteNode` job to its own queue, drains it, and
//! prints the reply.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use flowcore_core::{ExecutionId, NodeId};
use flowcore_sandbox::{FnHandler, Grant, InvocationOutcome, InvocationRequest, NodeRegistry, SandboxConfig, SandboxRunner};
use flowcore_transport::{ExecuteNode, ExecuteNodeReply, InMemoryQueue, NodePayload, Queue, ReplyStatus, TransportConfig};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowcore-node-runner", about = "Drain the execute-node queue")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Publish one `echo` node invocation to the queue before serving, so
    /// this process has something to drain on its own.
    #[arg(long)]
    seed_node: bool,
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    sandbox: SandboxConfig,
    transport: TransportConfig,
    poll_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { sandbox: SandboxConfig::default(), transport: TransportConfig::default(), poll_timeout_ms: 250 }
    }
}

fn load_settings(config: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(path) = config {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("FLOWCORE_NODE_RUNNER_").split("_"));
    Ok(figment.extract()?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn demo_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("echo", Arc::new(FnHandler(|_params, input| async move { Ok(input) })));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;

    let node_queue = Arc::new(InMemoryQueue::for_node_queue(&settings.transport));
    let reply_queue = Arc::new(InMemoryQueue::for_node_queue(&settings.transport));
    let runner = SandboxRunner::new(demo_registry(), settings.sandbox);

    if cli.seed_node {
        seed(&node_queue).await?;
    }

    let poll_timeout = Duration::from_millis(settings.poll_timeout_ms);
    if cli.once {
        let handled = run_until_idle(&runner, &node_queue, &reply_queue, poll_timeout).await;
        info!(handled, "queue drained, exiting (--once)");
        drain_replies(&reply_queue).await;
        return Ok(());
    }

    info!("node runner serving, ctrl-c to stop");
    tokio::select! {
        _ = async {
            loop {
                run_one(&runner, &node_queue, &reply_queue, poll_timeout).await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

async fn run_until_idle(
    runner: &SandboxRunner,
    node_queue: &Arc<InMemoryQueue>,
    reply_queue: &Arc<InMemoryQueue>,
    poll_timeout: Duration,
) -> usize {
    let mut handled = 0;
    while run_one(runner, node_queue, reply_queue, poll_timeout).await {
        handled += 1;
    }
    handled
}

/// Consume one `ExecuteNode`, run it, and publish the reply. Malformed
/// payloads are acked and dropped rather than retried forever — a poison
/// message can't be fixed by redelivery.
async fn run_one(
    runner: &SandboxRunner,
    node_queue: &Arc<InMemoryQueue>,
    reply_queue: &Arc<InMemoryQueue>,
    poll_timeout: Duration,
) -> bool {
    let Some((message_id, payload)) = node_queue.consume(poll_timeout).await.unwrap_or_else(|err| {
        error!(%err, "execute-node queue consume failed");
        None
    }) else {
        return false;
    };

    let job: ExecuteNode = match serde_json::from_value(payload) {
        Ok(job) => job,
        Err(err) => {
            error!(%err, "malformed ExecuteNode payload, acking to avoid a poison-message loop");
            let _ = node_queue.ack(&message_id).await;
            return true;
        }
    };

    let outcome = runner
        .run(InvocationRequest {
            node_type: job.node.node_type.clone(),
            parameters: job.node.data.clone(),
            input: job.input.clone(),
            timeout_override: None,
            grant: Grant::none(),
        })
        .await;

    let reply = match outcome {
        InvocationOutcome::Completed { output } => ExecuteNodeReply {
            execution_id: job.execution_id,
            node_id: job.node_id,
            attempt: job.attempt,
            status: ReplyStatus::Completed,
            output: Some(output),
            error: None,
            metadata: serde_json::json!({}),
        },
        InvocationOutcome::Failed { error } => ExecuteNodeReply {
            execution_id: job.execution_id,
            node_id: job.node_id,
            attempt: job.attempt,
            status: ReplyStatus::Failed,
            output: None,
            error: Some(serde_json::json!({"kind": error.kind(), "message": error.to_string()})),
            metadata: serde_json::json!({}),
        },
    };

    if let Ok(value) = serde_json::to_value(&reply) {
        let _ = reply_queue.publish(value).await;
    }
    let _ = node_queue.ack(&message_id).await;
    true
}

async fn drain_replies(reply_queue: &Arc<InMemoryQueue>) {
    while let Ok(Some((message_id, payload))) = reply_queue.consume(Duration::from_millis(20)).await {
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        let _ = reply_queue.ack(&message_id).await;
    }
}

async fn seed(queue: &InMemoryQueue) -> anyhow::Result<()> {
    let job = ExecuteNode {
        execution_id: ExecutionId::v4(),
        node_id: NodeId::v4(),
        attempt: 1,
        node: NodePayload { id: NodeId::v4(), node_type: "echo".into(), data: serde_json::json!({}) },
        input: serde_json::json!({"hello": "world"}),
        metadata: serde_json::json!({}),
        correlation_id: "seeded".into(),
    };
    queue.publish(serde_json::to_value(&job)?).await?;
    info!("seeded one execute-node job");
    Ok(())
}
