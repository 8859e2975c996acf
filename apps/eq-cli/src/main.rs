use clap::{Parser, Subcommand};
use eq_analysis::{AdvanceReport, AnalysisSummary};
use eq_model::ElementRegistry;
use eq_project::{BuiltModel, ProjectResult, build_model};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eq-cli")]
#[command(about = "Nonlinear equilibrium analysis of small structural models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate model file syntax and structure
    Validate {
        /// Path to the model file (YAML, or JSON by extension)
        model_path: PathBuf,
    },
    /// Show the analysis components a model file configures
    Describe {
        /// Path to the model file
        model_path: PathBuf,
    },
    /// Run the analysis described in a model file
    Run {
        /// Path to the model file
        model_path: PathBuf,
        /// Override the number of steps
        #[arg(long)]
        steps: Option<usize>,
        /// Override the time step of a transient analysis
        #[arg(long)]
        dt: Option<f64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ProjectResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Describe { model_path } => cmd_describe(&model_path),
        Commands::Run {
            model_path,
            steps,
            dt,
            json,
        } => cmd_run(&model_path, steps, dt, json),
    }
}

fn build(model_path: &Path) -> ProjectResult<BuiltModel> {
    let model = eq_project::load(model_path)?;
    let registry = ElementRegistry::with_builtin();
    build_model(&model, &registry)
}

fn cmd_validate(model_path: &Path) -> ProjectResult<()> {
    println!("Validating model: {}", model_path.display());
    let model = eq_project::load(model_path)?;
    println!(
        "✓ Model is valid ({} nodes, {} elements, {} load patterns)",
        model.nodes.len(),
        model.elements.len(),
        model.load_patterns.len()
    );
    Ok(())
}

fn cmd_describe(model_path: &Path) -> ProjectResult<()> {
    let mut built = build(model_path)?;
    built.analysis.reconcile_domain_change()?;
    println!("{}", built.analysis.summary());
    println!("steps:       {}", built.steps);
    if built.step_size > 0.0 {
        println!("step size:   {}", built.step_size);
    }
    Ok(())
}

#[derive(Serialize)]
struct RunOutput {
    summary: AnalysisSummary,
    report: AdvanceReport,
    displacements: Vec<NodeDisplacement>,
}

#[derive(Serialize)]
struct NodeDisplacement {
    node: String,
    disp: Vec<f64>,
}

fn cmd_run(model_path: &Path, steps: Option<usize>, dt: Option<f64>, json: bool) -> ProjectResult<()> {
    let mut built = build(model_path)?;
    let steps = steps.unwrap_or(built.steps);
    let dt = dt.unwrap_or(built.step_size);
    info!(model = %model_path.display(), steps, dt, "running analysis");

    built.analysis.initialize()?;
    let report = built.analysis.advance(steps, dt)?;

    let mut displacements = Vec::with_capacity(built.nodes.len());
    for (name, &id) in &built.nodes {
        let node = built.analysis.domain().node(id)?;
        displacements.push(NodeDisplacement {
            node: name.clone(),
            disp: node.disp().to_vec(),
        });
    }

    if json {
        let output = RunOutput {
            summary: built.analysis.summary(),
            report,
            displacements,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{:>5} {:>12} {:>6} {:>6} {:>12}", "step", "time", "iter", "fact", "norm");
    for record in &report.steps {
        let norm = record
            .residual_norm
            .map(|n| format!("{n:.3e}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5} {:>12.6} {:>6} {:>6} {:>12}",
            record.step, record.time, record.iterations, record.factorizations, norm
        );
    }
    println!("✓ {} steps committed, {} iterations", report.steps.len(), report.total_iterations());
    if let Some(algorithm) = built.analysis.algorithm() {
        let stats = algorithm.stats();
        println!(
            "  algorithm time {:.3} ms total, {:.3} ms in linear solves ({:.3} ms per step)",
            stats.total_time.total_seconds() * 1e3,
            stats.solve_time.total_seconds() * 1e3,
            stats.solve_time.average_seconds() * 1e3
        );
    }
    println!("Displacements:");
    for d in &displacements {
        let values: Vec<String> = d.disp.iter().map(|u| format!("{u:.6e}")).collect();
        println!("  {:<12} [{}]", d.node, values.join(", "));
    }
    Ok(())
}
