//! vmexec — host shell for the execution orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vmexec_control::ControlFacade;
use vmexec_core::{OrchestratorConfig, SharedExecutor};

mod demo;

use demo::{PageExecutor, PAGE_SIZE};

const DEFAULT_RUN_MILLIS: u64 = 200;
const DEFAULT_THREADS: u64 = 3;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "run" | "--run" => {
            let millis = parse_arg(&args, 2, DEFAULT_RUN_MILLIS);
            let threads = parse_arg(&args, 3, DEFAULT_THREADS).max(1);
            run(millis, threads).await
        }
        "stats" | "--stats" | "status" => {
            let facade = ControlFacade::new(OrchestratorConfig::from_env()?);
            facade.ensure_initialized().await;
            println!("{}", serde_json::to_string_pretty(&facade.status())?);
            Ok(())
        }
        "--help" | "-h" | "help" => {
            println!("vmexec — concurrent execution orchestrator host");
            println!();
            println!("Usage: vmexec [command]");
            println!();
            println!("Commands:");
            println!("  run [millis] [threads]   Run the demo executor and print statistics");
            println!("  stats                    Show orchestrator availability");
            println!("  help                     Show this help message");
            println!();
            println!("Environment:");
            println!("  VMEXEC_ENTRY_POINT        Entry address of the first thread (default 0x1000)");
            println!("  VMEXEC_INSTRUCTION_WIDTH  Program counter step (default 4)");
            println!("  VMEXEC_ACCELERATION       Set to 0/off to disable the orchestrator");
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'vmexec help' for usage.", other);
            std::process::exit(1);
        }
    }
}

fn parse_arg(args: &[String], index: usize, default: u64) -> u64 {
    args.get(index)
        .and_then(|a| a.parse().ok())
        .unwrap_or(default)
}

/// Start address of the `index`-th demo thread, one page past the previous.
fn thread_start(entry_point: u64, index: u64) -> anyhow::Result<u64> {
    index
        .checked_mul(PAGE_SIZE)
        .and_then(|offset| entry_point.checked_add(offset))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "thread {} start address overflows from entry point {:#x}",
                index,
                entry_point
            )
        })
}

async fn run(millis: u64, threads: u64) -> anyhow::Result<()> {
    let config = OrchestratorConfig::from_env()?;
    let facade = ControlFacade::new(config);

    if !facade.ensure_initialized().await {
        warn!("Orchestrator unavailable, nothing to run");
        println!("{}", serde_json::to_string_pretty(&facade.status())?);
        return Ok(());
    }

    let executor: SharedExecutor = Arc::new(PageExecutor::new(PAGE_SIZE, config.instruction_width));
    facade.initialize(Some(executor))?;
    facade.record_memory_allocation(PAGE_SIZE * threads)?;

    if !facade.start()? {
        anyhow::bail!("orchestrator is already running");
    }
    for i in 1..threads {
        let id = facade.create_thread(thread_start(config.entry_point, i)?)?;
        info!("Created thread {}", id);
    }

    tokio::time::sleep(Duration::from_millis(millis)).await;
    println!("{}", serde_json::to_string_pretty(&facade.get_stats()?)?);

    facade.stop()?;
    if !facade.quiesce(DRAIN_TIMEOUT).await? {
        warn!("Execution loops still draining after {:?}", DRAIN_TIMEOUT);
    }
    println!("{}", serde_json::to_string_pretty(&facade.get_stats()?)?);
    Ok(())
}
