//! Matrioska CLI
//!
//! Runs the generation pipeline from the terminal and inspects the
//! checkpoints it leaves behind.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::RunArgs;
use matrioska_core::skills::create_generator;
use matrioska_core::state::{resolve_base_path, CheckpointManager};
use matrioska_core::swarm::{
    Orchestrator, OrchestratorCommand, PipelineEvent, PipelineEventKind, PipelineRun,
    PipelineStage,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Exit status when no plan could be established
const EXIT_NO_PLAN: u8 = 2;

#[derive(Parser)]
#[command(author, version, about = "Matrioska - plan-driven multi-file generation")]
struct Args {
    /// Directory holding matrioska_checkpoints/ and matrioska_artifacts/
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Plan and generate artifacts for a task, resuming any interrupted run
    Run(RunArgs),
    /// Show the persisted plan and progress
    Status,
    /// Print the whiteboard as of the last committed artifact
    Whiteboard,
    /// Delete all checkpoints and artifacts
    Reset,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        CliCommand::Run(run_args) => run(run_args, args.base_path).await,
        CliCommand::Status => {
            status(checkpoints(args.base_path)).await?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Whiteboard => {
            let checkpoints = checkpoints(args.base_path);
            let board = match checkpoints.load_manifest().await? {
                Some(manifest) => manifest.whiteboard(),
                None => checkpoints.load_whiteboard().await?,
            };
            println!("{}", serde_json::to_string_pretty(&board.snapshot())?);
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Reset => {
            let checkpoints = checkpoints(args.base_path);
            checkpoints.reset().await?;
            println!("🧹 Removed checkpoints under {}", checkpoints.base_path().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn checkpoints(base_path: Option<PathBuf>) -> CheckpointManager {
    CheckpointManager::new(resolve_base_path(base_path.as_deref()))
}

async fn run(args: RunArgs, base_path: Option<PathBuf>) -> Result<ExitCode> {
    let config = args.to_config(base_path.as_deref()).await?;
    let generator = create_generator(&config.model)?;

    println!("🚀 Running pipeline for task: {}", args.task.trim());
    println!(
        "   Model: {} / {}",
        config.model.provider.display_name(),
        config.model.model
    );

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let (command_tx, command_rx) = mpsc::channel::<OrchestratorCommand>(4);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Cancelling; the current artifact will not be committed");
            let _ = command_tx.send(OrchestratorCommand::Cancel).await;
        }
    });

    let mut orchestrator = Orchestrator::new(config, generator)
        .with_event_channel(event_tx)
        .with_command_channel(command_rx);
    let artifact_dir = orchestrator.checkpoints().artifact_dir();

    let result = orchestrator.run(&args.task).await;
    drop(orchestrator);
    let _ = printer.await;

    match result {
        Ok(run) => {
            print_summary(&run, &artifact_dir);
            Ok(if run.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            eprintln!("❌ No plan: {}", e);
            Ok(ExitCode::from(EXIT_NO_PLAN))
        }
    }
}

fn print_event(event: &PipelineEvent) {
    let artifact = event.artifact.as_deref().unwrap_or("");
    match event.kind {
        PipelineEventKind::PlanSynthesized | PipelineEventKind::PlanRestored => {
            println!("📐 {}", event.message)
        }
        PipelineEventKind::ArtifactStarted => println!("🔨 {}", artifact),
        PipelineEventKind::ArtifactCompleted => println!("   ✅ {}", event.message),
        PipelineEventKind::Warning => println!("   ⚠️  {}", event.message),
        PipelineEventKind::RunFailed | PipelineEventKind::RunCancelled => {
            eprintln!("❌ {}", event.message)
        }
        PipelineEventKind::RunStarted
        | PipelineEventKind::WhiteboardUpdated
        | PipelineEventKind::RunCompleted => {
            tracing::debug!(seq = event.seq, kind = ?event.kind, "{}", event.message)
        }
    }
}

fn print_summary(run: &PipelineRun, artifact_dir: &std::path::Path) {
    match &run.error {
        None => println!(
            "✅ {} complete: {} artifact(s) in {}",
            run.plan.project_name,
            run.artifacts.len(),
            artifact_dir.display()
        ),
        Some(e) => {
            eprintln!("❌ Stopped at {}: {}", run.stage, e);
            if let Some(order) = run.highest_completed_order {
                eprintln!("   Committed through order {}; rerun to resume", order);
            }
        }
    }
    if !run.warnings.is_empty() {
        println!("   Warnings: {}", run.warnings.len());
    }
}

async fn status(checkpoints: CheckpointManager) -> Result<()> {
    let Some(plan) = checkpoints.load_plan().await? else {
        println!("No plan under {}", checkpoints.base_path().display());
        return Ok(());
    };
    let manifest = checkpoints.load_manifest().await?;

    println!("📐 {} ({} artifacts)", plan.project_name, plan.len());
    if let Some(manifest) = &manifest {
        println!("   Task: {}", manifest.task);
        println!("   Stage: {}", manifest.stage);
    }

    for spec in &plan.artifacts {
        let file = spec.file_name();
        let done = manifest.as_ref().is_some_and(|m| m.is_committed(&file));
        println!("   {} {:>3}  {}", if done { "✅" } else { "⬜" }, spec.order, file);
    }

    if let Some(manifest) = manifest {
        match manifest.highest_completed_order() {
            Some(order) => println!("   Highest committed order: {}", order),
            None => println!("   Nothing committed yet"),
        }
        for warning in &manifest.warnings {
            println!("   ⚠️  {}", warning);
        }
        if let Some(error) = &manifest.last_error {
            if manifest.stage != PipelineStage::Complete {
                println!("   ❌ Last error: {}", error);
            }
        }
    }
    Ok(())
}
