//! Command-line interface for kinetic model formulation and fitting
//!
//! # Usage
//!
//! ```bash
//! # Print the elemental steps of every mechanism
//! ketchup expand --path project.json
//!
//! # Check a project for inconsistencies
//! ketchup validate --path project.json
//!
//! # Fit a project from five seeds and keep the best solution
//! ketchup fit --path project.json --seed 42 --starts 5 --output solution.json
//! ```

use std::{fs::File, path::PathBuf, process};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ketchup::{
    compose::{solve, ExperimentComposer},
    io::load_project,
    mechanism::{catalog::MechanismCatalog, record::RateLawFamily},
    report::SolutionReport,
    seed::fallback_seed,
    solver::penalty::PenaltyLbfgs,
    stability::StabilityAnalyzer,
    validation::check_consistency,
};
use log::{info, warn};
use tabled::{builder::Builder, settings::Style};

/// Main CLI configuration struct
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Print the elemental step table of every mechanism
    Expand {
        /// Path to the project file
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Check a project for inconsistencies
    Validate {
        /// Path to the project file
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Compose, solve and analyse a project
    Fit {
        /// Path to the project file
        #[arg(short, long)]
        path: PathBuf,

        /// Seed of the first start; overrides the project options
        #[arg(long)]
        seed: Option<u64>,

        /// Number of starts with consecutive seeds
        #[arg(long, default_value_t = 1)]
        starts: u64,

        /// Iterations per penalty round
        #[arg(long, default_value_t = 500)]
        max_iters: u64,

        /// Largest accepted constraint violation
        #[arg(long, default_value_t = 1e-6)]
        tolerance: f64,

        /// Log every solver iteration
        #[arg(short, long, default_value_t = false)]
        verbose: bool,

        /// Path of the solution report, printed to stdout if absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Main entry point for the CLI application
pub fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Expand { path } => {
            let project = load_project(path).expect("Failed to load project");
            let catalog = MechanismCatalog::build(&project.mechanisms, RateLawFamily::Elemental)
                .expect("Failed to expand mechanisms");

            let mut builder = Builder::default();
            builder.push_record(vec!["Label", "Kind", "Reactants", "Products"]);
            for step in catalog.steps() {
                builder.push_record(vec![
                    step.label(),
                    step.kind.to_string(),
                    step.reactants.join(" + "),
                    step.products.join(" + "),
                ]);
            }
            let mut table = builder.build();
            table.with(Style::sharp());
            println!("{table}");
        }
        Commands::Validate { path } => {
            let project = load_project(path).expect("Failed to load project");
            let report = check_consistency(
                &project.network,
                &project.mechanisms,
                &project.datasets,
                project.options.mechanism_type,
            );
            for result in &report.errors {
                println!("{result}");
            }
            if !report.is_valid {
                process::exit(1);
            }
            println!("Project is consistent");
        }
        Commands::Fit {
            path,
            seed,
            starts,
            max_iters,
            tolerance,
            verbose,
            output,
        } => {
            let project = load_project(path).expect("Failed to load project");
            let first = seed.or(project.options.seed).unwrap_or_else(fallback_seed);
            let analyzer = StabilityAnalyzer::new(project.options.stability_threshold);

            let pb = ProgressBar::new(*starts);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} | {elapsed}/{eta} | {msg}")
                    .expect("Invalid progress template")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );

            let mut best: Option<SolutionReport> = None;
            for s in first..first.saturating_add(*starts) {
                pb.set_message(format!("seed {s}"));

                let mut options = project.options.clone();
                options.seed = Some(s);
                let composition = ExperimentComposer::builder()
                    .network(&project.network)
                    .mechanisms(&project.mechanisms)
                    .datasets(&project.datasets)
                    .options(options)
                    .build()
                    .compose()
                    .expect("Failed to compose model");

                let mut model = composition.model;
                let mut backend = PenaltyLbfgs::builder()
                    .max_iters(*max_iters)
                    .tolerance(*tolerance)
                    .verbose(*verbose)
                    .build();
                let status = solve(&mut model, &mut backend);
                info!("Seed {s}: {status}, objective {:e}", model.objective_value());

                let stability = analyzer.analyze(&model);
                let report = SolutionReport::from_model(&model, stability).with_seed(s);

                let better = match &best {
                    None => true,
                    Some(current) => {
                        status.is_optimal()
                            && (current.status != "optimal" || report.objective < current.objective)
                    }
                };
                if better {
                    best = Some(report);
                }
                pb.inc(1);
            }
            pb.finish_with_message("done");

            let Some(report) = best else {
                warn!("No starts were run");
                return;
            };

            match output {
                Some(path) => {
                    let file = File::create(path).expect("Failed to create report file");
                    serde_json::to_writer_pretty(file, &report).expect("Failed to write report");
                }
                None => println!(
                    "{}",
                    serde_json::to_string_pretty(&report).expect("Failed to serialize report")
                ),
            }
        }
    }
}
