use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use split_decision::cli::{exit_code, Args, Command};
use split_decision::config::ExperimentFile;
use split_decision::experiment::ExperimentRegistry;
use split_decision::report;
use split_decision::simulate::Simulation;

/// Create every definition in a fresh registry, reporting failures.
/// Returns the registry and the number of rejected definitions.
fn load_registry(file: &ExperimentFile, json: bool) -> (ExperimentRegistry, usize) {
    let registry = ExperimentRegistry::new();
    let mut failures = 0;
    for spec in &file.experiments {
        let id = spec.id.clone();
        match registry.create_experiment(spec.clone()) {
            Ok(exp) => {
                if !json {
                    print!("{}", report::render_experiment(&exp));
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", "rejected".bright_red().bold(), id, e);
            }
        }
    }
    (registry, failures)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let file = ExperimentFile::load(&args.file)?;

    match &args.command {
        Command::Validate => {
            let (registry, failures) = load_registry(&file, args.json);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&registry.list_experiments())?);
            } else {
                println!(
                    "{} valid, {} rejected",
                    registry.len().to_string().bright_green(),
                    failures.to_string().bright_red()
                );
            }
            std::process::exit(exit_code(failures));
        }

        Command::Assign { experiment, user } => {
            let spec = file
                .find(experiment)
                .ok_or_else(|| format!("experiment '{experiment}' not in {}", args.file.display()))?;
            let registry = ExperimentRegistry::new();
            registry.create_experiment(spec.clone())?;
            registry.start_experiment(experiment)?;
            let variant = registry.get_variant_for_user(experiment, user)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&variant)?);
            } else {
                println!("{} → {}", user.bright_white(), report::render_variant(&variant));
            }
        }

        Command::Simulate { users, seed, experiment } => {
            let (registry, failures) = load_registry(&file, args.json);
            let sim = Simulation { users: *users, seed: *seed };
            let mut all = Vec::new();

            for exp in registry.list_experiments() {
                if experiment.as_ref().is_some_and(|only| *only != exp.id) {
                    continue;
                }
                registry.start_experiment(&exp.id)?;
                let run = sim.run(&registry, &exp.id)?;
                if registry.ready_for_early_stop(&exp.id)? {
                    tracing::info!(experiment = %exp.id, "minimum sample size reached, stopping early");
                    registry.stop_experiment(&exp.id)?;
                }
                let results = registry.analyze_experiment(&exp.id)?;
                if args.json {
                    all.push(serde_json::json!({ "simulation": run, "results": results }));
                } else {
                    print!("{}", report::render_results(&exp.id, &results));
                }
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            }
            std::process::exit(exit_code(failures));
        }
    }

    Ok(())
}
