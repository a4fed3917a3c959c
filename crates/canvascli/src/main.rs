// crates/canvascli/src/main.rs

use anyhow::{Context, Result};
use canvascore::{CanvasGraph, CanvasNode, ChannelSink, EventPayload, NodeType, Record, RunEvent};
use canvasruntime::{CanvasRuntime, ExecutorRegistry, RuntimeConfig, ValidationResult};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "canvas")]
#[command(about = "Canvas graph compiler and runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a canvas file with pass-through executors
    Run {
        /// Path to canvas JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Run input as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Canvas id recorded on the run (defaults to the file stem)
        #[arg(long)]
        canvas_id: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a canvas file
    Validate {
        /// Path to canvas JSON file
        file: PathBuf,
    },

    /// Print the execution plan of a canvas file
    Plan {
        /// Path to canvas JSON file
        file: PathBuf,
    },

    /// List node types and their allowed connections
    Types,

    /// Create an example canvas
    Init {
        /// Output file path
        #[arg(short, long, default_value = "canvas.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            canvas_id,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::WARN)
                    .init();
            }

            run_canvas(file, input, canvas_id).await?;
        }

        Commands::Validate { file } => {
            let graph = load_canvas(&file)?;
            let result = build_runtime()?.validate(&graph);
            print_validation(&result);
            if !result.valid {
                std::process::exit(1);
            }
        }

        Commands::Plan { file } => {
            let graph = load_canvas(&file)?;
            let plan = build_runtime()?.plan(&graph)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Types => {
            list_types();
        }

        Commands::Init { output } => {
            create_example_canvas(output)?;
        }
    }

    Ok(())
}

fn build_runtime() -> Result<CanvasRuntime> {
    let mut registry = ExecutorRegistry::new();
    canvasnodes::register_all(&mut registry);
    Ok(CanvasRuntime::with_registry(
        Arc::new(registry),
        RuntimeConfig::from_env(),
    )?)
}

fn load_canvas(file: &Path) -> Result<CanvasGraph> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", file.display()))
}

fn parse_input(input: Option<String>) -> Result<Record> {
    let Some(input) = input else {
        return Ok(Record::new());
    };
    match serde_json::from_str(&input)? {
        serde_json::Value::Object(record) => Ok(record),
        _ => Err(anyhow::anyhow!("Input must be a JSON object")),
    }
}

async fn run_canvas(file: PathBuf, input: Option<String>, canvas_id: Option<String>) -> Result<()> {
    println!("🚀 Loading canvas from: {}", file.display());

    let graph = load_canvas(&file)?;
    let input = parse_input(input)?;
    let canvas_id = canvas_id.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "canvas".to_string())
    });

    println!("📋 Canvas: {}", canvas_id);
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", graph.edges.len());
    println!();

    let runtime = build_runtime()?;
    let validation = runtime.validate(&graph);
    for warning in &validation.warnings {
        println!("⚠️  {}", warning);
    }

    // The channel sink is lossless, so every event is printed in order
    let (sink, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let report = runtime
        .run_with_sink(canvas_id, &graph, input, Arc::new(sink))
        .await;

    // The sink was moved into the run, so the channel is closed by now
    printer.await?;

    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", report.run.id);
    println!("   Status: {:?}", report.run.status);
    println!("   Steps: {}", report.steps.len());

    if let Some(output) = &report.run.output {
        println!();
        println!("📤 Output:");
        println!("{}", serde_json::to_string_pretty(output)?);
    }

    if let Some(error) = &report.run.error {
        return Err(anyhow::anyhow!("run failed: {}", error));
    }

    Ok(())
}

fn print_event(event: &RunEvent) {
    match &event.payload {
        EventPayload::RunStarted { total_steps, .. } => {
            println!("▶️  Run started ({} steps)", total_steps);
        }
        EventPayload::StepStarted {
            node_id,
            node_type,
            index,
            ..
        } => {
            println!("  ⚡ [{}] {} ({})", index, node_id, node_type);
        }
        EventPayload::StepCompleted {
            node_id, latency_ms, ..
        } => {
            println!("  ✅ {} completed in {}ms", node_id, latency_ms);
        }
        EventPayload::StepFailed { node_id, error, .. } => {
            println!("  ❌ {} failed: {}", node_id, error);
        }
        EventPayload::RunCompleted {
            total_latency_ms, ..
        } => {
            println!("✨ Run completed in {}ms", total_latency_ms);
        }
        EventPayload::RunFailed { error } => {
            println!("💥 Run failed: {}", error);
        }
        EventPayload::StepProgress { .. } => {}
    }
}

fn print_validation(result: &ValidationResult) {
    if result.valid {
        println!("✅ Canvas is valid");
    } else {
        println!("❌ Canvas is invalid");
    }
    for error in &result.errors {
        println!("   error   {}", error);
    }
    for warning in &result.warnings {
        println!("   warning {}", warning);
    }
}

fn list_types() {
    println!("📦 Node Types:");
    println!();

    for node_type in NodeType::ALL {
        let mut role = Vec::new();
        if node_type.is_entry() {
            role.push("entry");
        }
        if node_type.is_terminal() {
            role.push("terminal");
        }
        let targets: Vec<_> = node_type
            .allowed_targets()
            .iter()
            .map(NodeType::as_str)
            .collect();

        if role.is_empty() {
            println!("  • {}", node_type);
        } else {
            println!("  • {} ({})", node_type, role.join(", "));
        }
        println!("    → {}", if targets.is_empty() { "-".to_string() } else { targets.join(", ") });
    }
}

fn create_example_canvas(output: PathBuf) -> Result<()> {
    let mut graph = CanvasGraph::new();
    graph.add_node(CanvasNode::new("query", NodeType::Query).with_label("Question"));
    graph.add_node(
        CanvasNode::new("embed", NodeType::Embed)
            .with_label("Embed")
            .with_config("emit", serde_json::json!({ "embedding": [0.12, 0.48, 0.33] })),
    );
    graph.add_node(
        CanvasNode::new("retrieve", NodeType::Retrieve)
            .with_label("Retrieve")
            .with_config("emit", serde_json::json!({ "documents": ["doc-1", "doc-2"] })),
    );
    graph.add_node(CanvasNode::new("generate", NodeType::Generate).with_label("Answer"));
    graph.connect("query", "embed");
    graph.connect("embed", "retrieve");
    graph.connect("retrieve", "generate");

    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example canvas: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  canvas run --file {} --input '{{\"query\": \"what is a borrow checker?\"}}'",
        output.display()
    );

    Ok(())
}
