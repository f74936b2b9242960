mod cli;
mod logging;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use spool_core::{
    HandlerRegistry, JobHandler, JobId, JobQueue, QueueBuilder, QueueConfig, QueueError,
    WorkerGroup,
};
use tracing::info;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("spool error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = QueueConfig::from_env().context("reading SPOOL_* environment")?;
    if let Some(root) = args.root {
        config.root = root;
    }
    if !args.job_types.is_empty() {
        config.job_types = args.job_types;
    }

    let root = config.root.clone();
    let queue = QueueBuilder::from_config(config)
        .open()
        .await
        .with_context(|| format!("opening queue at {}", root.display()))?;

    match args.command {
        Command::Enqueue {
            job_type,
            args,
            after,
        } => {
            let args = parse_json("--args", &args)?;
            let id = queue.enqueue(&job_type, &args, &after).await?;
            print_json(&json!({ "id": id }))
        }
        Command::Dequeue {
            types,
            timeout_secs,
        } => {
            let cancel = shutdown::install_shutdown_handler();
            if let Some(secs) = timeout_secs {
                let token = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    token.cancel();
                });
            }

            let types: Vec<&str> = types.iter().map(String::as_str).collect();
            match queue.dequeue_job(&cancel, &types).await {
                Ok(record) => print_json(&record),
                Err(QueueError::Canceled) => {
                    anyhow::bail!("no job became ready before the wait was canceled")
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Finish { id, result } => {
            let result = parse_json("--result", &result)?;
            queue.finish_job(id, &result).await?;
            print_json(&json!({ "id": id, "finished": true }))
        }
        Command::Cancel { id } => {
            queue.cancel_job(id).await?;
            let status = queue.job_status(id).await?;
            print_json(&json!({ "id": id, "canceled": status.canceled }))
        }
        Command::Status { id } => {
            let status = queue.job_status(id).await?;
            print_json(&json!({
                "id": id,
                "state": status.state(),
                "queued_at": status.queued_at,
                "started_at": status.started_at,
                "finished_at": status.finished_at,
                "canceled": status.canceled,
                "result": status.raw_result(),
            }))
        }
        Command::Counts => print_json(&queue.counts().await?),
        Command::Work { types, workers } => work(queue, &types, workers).await,
    }
}

/// Stores its args as the job's output.
struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, id: JobId, args: Value) -> std::result::Result<Value, String> {
        info!(job = %id, "echo");
        Ok(args)
    }
}

async fn work(queue: JobQueue, types: &[String], workers: usize) -> Result<()> {
    let mut registry = HandlerRegistry::new();
    for job_type in types {
        registry.register(job_type.as_str(), Arc::new(EchoHandler))?;
    }

    let shutdown = shutdown::install_shutdown_handler();
    let group = WorkerGroup::spawn(workers, Arc::new(queue), Arc::new(registry));
    info!(workers, ?types, "workers running, press Ctrl-C to stop");

    shutdown.cancelled().await;
    group.shutdown_and_join().await;
    Ok(())
}

fn parse_json(flag: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON: {raw}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
