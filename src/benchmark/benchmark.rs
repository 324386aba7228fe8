//! Accuracy and speed benchmarks
//!
//! The accuracy benchmark resets one `Simulation` from the same serialized
//! body set before every strategy/integrator run, advances it to a fixed
//! simulated time and compares named pair distances against literal reference
//! distances taken from an ephemeris. The result is appended to a text log.
//!
//! The speed benchmark prints per-step wall time of every strategy for growing
//! body counts as CSV.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::configuration::config::{BenchmarkConfig, BenchmarkRunConfig, IntegratorConfig, StrategyConfig};
use crate::simulation::engine::{Engine, IntegratorKind, Strategy};
use crate::simulation::error::SimError;
use crate::simulation::params::Parameters;
use crate::simulation::scheduler::{RunReport, Simulation};
use crate::simulation::states::BodyRecord;

/// Measured distance of one reference pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub from: String,
    pub to: String,
    pub reference: i64, // m
    pub distance: i64,  // m
}

impl PairOutcome {
    /// Percentage deviation, positive when the simulated distance is short
    pub fn error_percent(&self) -> f64 {
        100.0 * (1.0 - self.distance as f64 / self.reference as f64)
    }
}

/// One strategy/integrator run
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub report: RunReport,
    pub time_step: f64,
    pub pairs: Vec<PairOutcome>,
}

impl StrategyOutcome {
    pub fn label(&self) -> String {
        format!("{}/{}", self.report.strategy, self.report.integrator)
    }
}

/// Everything one benchmark invocation produced
#[derive(Debug, Clone)]
pub struct AccuracyReport {
    pub timestamp: u64, // seconds since the unix epoch
    pub config: BenchmarkConfig,
    pub outcomes: Vec<StrategyOutcome>,
}

/// Every strategy with euler, plus partitioned RK4
pub fn default_runs() -> Vec<BenchmarkRunConfig> {
    let euler = |strategy| BenchmarkRunConfig {
        strategy,
        integrator: IntegratorConfig::Euler,
    };
    vec![
        euler(StrategyConfig::Serial),
        euler(StrategyConfig::Parallel),
        euler(StrategyConfig::Partitioned),
        euler(StrategyConfig::Halved),
        euler(StrategyConfig::Locked),
        BenchmarkRunConfig {
            strategy: StrategyConfig::Partitioned,
            integrator: IntegratorConfig::Rk4,
        },
    ]
}

/// Run every configured strategy from `initial` and compare against the references
///
/// `base` supplies the worker count, barrier mode and proximity guard shared by all runs.
pub fn run_accuracy_benchmark(
    initial: &[BodyRecord],
    config: &BenchmarkConfig,
    base: &Engine,
) -> Result<AccuracyReport, SimError> {
    let runs = if config.runs.is_empty() {
        default_runs()
    } else {
        config.runs.clone()
    };

    let parameters = Parameters {
        time_step: config.euler_time_step,
        steps: config.euler_steps,
    };
    let mut sim = Simulation::new(initial, parameters, Engine::default())?;
    let mut outcomes = Vec::with_capacity(runs.len());

    for run in runs {
        if run.strategy == StrategyConfig::Stepped {
            warn!("skipping stepped strategy: it needs an external tick");
            continue;
        }
        let engine = Engine {
            strategy: run.strategy.to_strategy(1),
            integrator: run.integrator.into(),
            ..*base
        };
        if let Err(err) = engine.validate() {
            warn!("skipping {}/{}: {err}", engine.strategy, engine.integrator);
            continue;
        }

        let (steps, time_step) = match engine.integrator {
            IntegratorKind::Euler => (config.euler_steps, config.euler_time_step),
            IntegratorKind::Rk4 => (config.rk4_steps, config.rk4_time_step),
        };

        sim.set_engine(engine)?;
        sim.reset(initial, time_step)?;
        let report = sim.advance(steps)?;

        let pairs = config
            .references
            .iter()
            .map(|r| {
                Ok(PairOutcome {
                    from: r.from.clone(),
                    to: r.to.clone(),
                    reference: r.distance,
                    distance: sim.distance(&r.from, &r.to)?,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        let outcome = StrategyOutcome {
            report,
            time_step,
            pairs,
        };
        info!(
            "{}: {} steps in {} ms",
            outcome.label(),
            steps,
            outcome.report.elapsed.as_millis()
        );
        outcomes.push(outcome);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    Ok(AccuracyReport {
        timestamp,
        config: config.clone(),
        outcomes,
    })
}

impl AccuracyReport {
    /// Human readable block, one per benchmark invocation
    pub fn render(&self) -> String {
        let mut out = String::new();
        let labels: Vec<String> = self.outcomes.iter().map(StrategyOutcome::label).collect();

        let _ = writeln!(out, "Time of test: {} (unix seconds)", self.timestamp);
        let _ = writeln!(
            out,
            "Euler steps: {}, time step: {}",
            self.config.euler_steps, self.config.euler_time_step
        );
        let _ = writeln!(
            out,
            "Runge-Kutta RK4 steps: {}, time step: {}",
            self.config.rk4_steps, self.config.rk4_time_step
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "Body pair, reference distance, {}:", labels.join(", "));
        for (i, reference) in self.config.references.iter().enumerate() {
            let distances: Vec<String> = self
                .outcomes
                .iter()
                .map(|o| o.pairs[i].distance.to_string())
                .collect();
            let _ = writeln!(
                out,
                "{} to {}: {}, {}",
                reference.from,
                reference.to,
                reference.distance,
                distances.join(", ")
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Body pair, error of {}:", labels.join(", "));
        for (i, reference) in self.config.references.iter().enumerate() {
            let errors: Vec<String> = self
                .outcomes
                .iter()
                .map(|o| format!("{:.6}%", o.pairs[i].error_percent()))
                .collect();
            let _ = writeln!(out, "{} to {}: {}", reference.from, reference.to, errors.join(", "));
        }
        let _ = writeln!(out);

        let times: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| format!("{}: {} ms", o.label(), o.report.elapsed.as_millis()))
            .collect();
        let _ = writeln!(out, "Times: {}", times.join(", "));
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "-".repeat(100));
        let _ = writeln!(out);
        out
    }
}

/// Append the rendered report to `path`, creating the file if needed
pub fn append_report(path: &Path, report: &AccuracyReport) -> Result<(), SimError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(report.render().as_bytes())?;
    Ok(())
}

// =========================================================================================
// Speed comparison
// =========================================================================================

/// Helper to build a deterministic body set of size `n`
///
/// Massive bodies spread over a few AU so the full O(n^2) force law is what
/// gets measured.
pub fn make_bodies(n: usize) -> Vec<BodyRecord> {
    (0..n)
        .map(|i| {
            let i_f = i as f64;
            // deterministic positions, no rand needed
            let x = ((i_f * 0.37).sin() * 5.0e11) as i64 + i as i64;
            let y = ((i_f * 0.13).cos() * 5.0e11) as i64;
            BodyRecord::new(&format!("body-{i}"), 1.0e24, true, 1_000, [x, y], [0.0, 0.0])
        })
        .collect()
}

/// Per-step milliseconds for one strategy
#[derive(Debug, Clone)]
pub struct SpeedSample {
    pub bodies: usize,
    pub strategy: Strategy,
    pub ms_per_step: f64,
}

/// Time every caller-driven and run-to-completion strategy for each body count
///
/// Prints `N,<strategy>_ms,...` CSV rows; paste into a spreadsheet to graph.
pub fn bench_strategies(ns: &[usize], steps: u64, workers: Option<usize>) -> Result<Vec<SpeedSample>, SimError> {
    let strategies = [
        Strategy::Serial,
        Strategy::Parallel,
        Strategy::Partitioned,
        Strategy::Halved,
        Strategy::Locked,
    ];
    let header: Vec<String> = strategies.iter().map(|s| format!("{s}_ms")).collect();
    println!("N,{}", header.join(","));

    let mut samples = Vec::new();
    for &n in ns {
        let bodies = make_bodies(n);
        let mut row = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            let mut engine = Engine::new(strategy, IntegratorKind::Euler);
            engine.workers = workers;
            let mut sim = Simulation::new(&bodies, Parameters { time_step: 1.0, steps }, engine)?;

            // warm-up
            sim.advance(1)?;
            let report = sim.advance(steps)?;
            let ms_per_step = report.elapsed.as_secs_f64() * 1000.0 / steps.max(1) as f64;

            row.push(format!("{ms_per_step:.6}"));
            samples.push(SpeedSample {
                bodies: n,
                strategy,
                ms_per_step,
            });
        }
        println!("{},{}", n, row.join(","));
    }
    Ok(samples)
}
