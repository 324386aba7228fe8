use gravsim::{append_report, bench_strategies, load_scenario, run_accuracy_benchmark, Scenario};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// scenario file, looked up in `scenarios/`
    #[arg(short, default_value = "two_body.yaml")]
    file_name: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// advance the scenario and print the final state
    Run {
        /// overrides `parameters.steps`
        #[arg(long)]
        steps: Option<u64>,
    },
    /// compare every strategy against the scenario's reference distances
    Bench,
    /// per-step timings of every strategy as CSV
    Speed,
}

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<Scenario> {
    let dir = scenarios_dir();
    let config_path = dir.join(file_name);
    let scenario_cfg = load_scenario(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    let scenario = Scenario::build_scenario(scenario_cfg, &dir).context("invalid scenario")?;
    Ok(scenario)
}

fn run(scenario: &Scenario, steps: Option<u64>) -> Result<()> {
    let steps = steps.unwrap_or(scenario.parameters.steps);
    let mut sim = scenario.simulation()?;
    let report = sim.advance(steps)?;

    println!(
        "{} / {}: {} steps on {} workers in {:?}",
        report.strategy, report.integrator, report.steps, report.workers, report.elapsed
    );
    for body in &sim.snapshot() {
        println!("{:>12}  x = {:>16}  y = {:>16}", body.name, body.position[0], body.position[1]);
    }
    Ok(())
}

fn bench(scenario: &Scenario, file_name: &str) -> Result<()> {
    let Some(cfg) = &scenario.benchmark else {
        bail!("{file_name} has no benchmark section");
    };
    let report = run_accuracy_benchmark(&scenario.bodies, cfg, &scenario.engine)?;
    print!("{}", report.render());

    append_report(&cfg.log_file, &report)
        .with_context(|| format!("failed to append to {}", cfg.log_file.display()))?;
    info!("report appended to {}", cfg.log_file.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Some(Command::Speed) => {
            bench_strategies(&[10, 50, 100, 200, 400, 800], 100, None)?;
        }
        Some(Command::Bench) => {
            let scenario = load_scenario_from_yaml(&args.file_name)?;
            bench(&scenario, &args.file_name)?;
        }
        Some(Command::Run { steps }) => {
            let scenario = load_scenario_from_yaml(&args.file_name)?;
            run(&scenario, steps)?;
        }
        None => {
            let scenario = load_scenario_from_yaml(&args.file_name)?;
            run(&scenario, None)?;
        }
    }

    Ok(())
}
