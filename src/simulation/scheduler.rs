//! Step scheduler: owns the body arena and advances it under a strategy
//!
//! Caller-driven strategies (`Serial`, `Parallel`) run on the calling thread.
//! Threaded strategies spawn one OS thread per worker for the whole run; each
//! worker loops over
//!
//! ```text
//! read phase (forces / stages) -> barrier -> commit phase -> [barrier] -> (gate)
//! ```
//!
//! until its stop condition is met. The second barrier is skipped in slim mode.
//! Cancellation is cooperative: a worker that sees the token at the top of a
//! step votes for that step, the vote is read by everyone after the first
//! barrier, and every worker leaves after committing the same step.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use rayon::prelude::*;

use super::engine::{BarrierMode, Engine, IntegratorKind, Strategy};
use super::error::SimError;
use super::forces::{write_pair_forces, NewtonianGravity};
use super::integrator::{
    commit_position, commit_rk4, commit_symmetric, compute_velocity, euler_integrator, rk4_integrator, rk4_stage,
};
use super::params::Parameters;
use super::partition::partition;
use super::states::{distance, Body, BodyRecord, IVec2, PeerScheme, System};

/// Shared cooperative stop flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// When a worker run ends on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// run exactly this many steps (or fewer if cancelled)
    AfterSteps(u64),
    /// run until the token is cancelled
    UntilCancelled,
}

/// Broadcast release point for cycle-gated workers
///
/// Workers remember the last generation they consumed and wait for a newer
/// one, so a tick is never lost and several ticks between two waits collapse
/// into a single release.
#[derive(Debug, Default)]
pub struct CycleGate {
    generation: Mutex<u64>,
    released: Condvar,
}

impl CycleGate {
    pub fn tick(&self) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.released.notify_all();
    }

    /// Wake waiters without releasing them, so they can observe cancellation
    fn wake(&self) {
        let _generation = self.generation.lock();
        self.released.notify_all();
    }

    fn wait(&self, consumed: &mut u64, token: &CancellationToken) {
        let mut generation = self.generation.lock();
        while *generation <= *consumed && !token.is_cancelled() {
            self.released.wait(&mut generation);
        }
        *consumed = *generation;
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub strategy: Strategy,
    pub integrator: IntegratorKind,
    pub workers: usize,
    pub steps: u64,
    pub elapsed: Duration,
}

/// All worker commits are blocked while this guard lives
pub struct PauseGuard<'a> {
    system: &'a System,
    _locks: Vec<MutexGuard<'a, ()>>,
}

impl PauseGuard<'_> {
    /// Positions with no commit in flight
    ///
    /// Every body is whole, but workers may straddle one step boundary: a
    /// worker that committed just before the pause is one step ahead of one
    /// that was waiting on its lock.
    pub fn positions(&self) -> Vec<IVec2> {
        self.system.positions()
    }
}

/// What one step does to one body, derived from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Euler,
    Rk4,
    Symmetric,
}

impl StepKind {
    fn of(engine: &Engine) -> Self {
        match (engine.strategy, engine.integrator) {
            (Strategy::Halved, _) => StepKind::Symmetric,
            (_, IntegratorKind::Euler) => StepKind::Euler,
            (_, IntegratorKind::Rk4) => StepKind::Rk4,
        }
    }

    #[inline]
    fn read(self, sys: &System, index: usize, law: &NewtonianGravity) {
        match self {
            StepKind::Euler => compute_velocity(sys, index, law),
            StepKind::Rk4 => rk4_stage(sys, index, law),
            StepKind::Symmetric => write_pair_forces(sys, index),
        }
    }

    #[inline]
    fn commit(self, sys: &System, index: usize) {
        match self {
            StepKind::Euler => commit_position(sys, index),
            StepKind::Rk4 => commit_rk4(sys, index),
            StepKind::Symmetric => commit_symmetric(sys, index),
        }
    }
}

/// State shared by the workers of one run
struct WorkerShared {
    system: Arc<System>,
    kind: StepKind,
    law: NewtonianGravity,
    barrier_mode: BarrierMode,
    locks_commit: bool,
    steps_per_cycle: Option<u64>,
    stop: StopCondition,
    barrier: Barrier,
    locks: Vec<Mutex<()>>,
    gate: CycleGate,
    token: CancellationToken,
    // lowest step at which some worker saw the token
    stop_vote: AtomicU64,
    // set when spawning failed and the run never started
    aborted: AtomicBool,
}

struct ActiveRun {
    shared: Arc<WorkerShared>,
    handles: Vec<JoinHandle<Result<u64, SimError>>>,
    started: Instant,
}

/// Text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Run one phase of a worker's bodies, containing a panic
///
/// On panic the worker votes to stop at `stop_at`, cancels the run and
/// releases the cycle gate. It keeps meeting the barriers afterwards so its
/// peers are never stranded on them.
fn guarded_phase(shared: &WorkerShared, worker: usize, stop_at: u64, phase: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(phase)) {
        Ok(()) => true,
        Err(payload) => {
            error!("worker {worker} panicked: {}", panic_message(payload.as_ref()));
            shared.stop_vote.fetch_min(stop_at, Ordering::Relaxed);
            shared.token.cancel();
            shared.gate.wake();
            false
        }
    }
}

/// One worker's loop; returns the number of steps it committed
fn run_worker(shared: &WorkerShared, worker: usize, bodies: &[usize]) -> Result<u64, SimError> {
    let sys = &*shared.system;
    let mut consumed = 0u64;
    let mut healthy = true;

    // start gate: opened once every worker has been spawned
    shared.gate.wait(&mut consumed, &shared.token);
    if shared.aborted.load(Ordering::Acquire) {
        return Ok(0);
    }
    trace!("worker {worker} running {} bodies", bodies.len());

    let mut step = 0u64;
    loop {
        if let StopCondition::AfterSteps(limit) = shared.stop {
            if step >= limit {
                break;
            }
        }
        if shared.token.is_cancelled() {
            shared.stop_vote.fetch_min(step, Ordering::Relaxed);
        }

        if healthy {
            // a failed read is voted for this step, before anyone reads the vote
            healthy = guarded_phase(shared, worker, step, || {
                for &i in bodies {
                    shared.kind.read(sys, i, &shared.law);
                }
            });
        }
        shared.barrier.wait();
        // votes for this step all happened before the barrier
        let stopping = shared.stop_vote.load(Ordering::Relaxed) <= step;

        if healthy {
            // a failed commit is too late for this step's vote, stop after the next one
            healthy = guarded_phase(shared, worker, step + 1, || {
                let _lock = shared.locks_commit.then(|| shared.locks[worker].lock());
                for &i in bodies {
                    shared.kind.commit(sys, i);
                }
            });
        }
        if shared.barrier_mode == BarrierMode::Full {
            shared.barrier.wait();
        }
        step += 1;

        if stopping || matches!(shared.stop, StopCondition::AfterSteps(limit) if step >= limit) {
            break;
        }
        if let Some(per_cycle) = shared.steps_per_cycle {
            if step % per_cycle == 0 {
                shared.gate.wait(&mut consumed, &shared.token);
            }
        }
    }
    trace!("worker {worker} stopped after {step} steps");
    if healthy {
        Ok(step)
    } else {
        Err(SimError::WorkerPanicked(worker))
    }
}

/// Owner of the body arena and the worker pool driving it
pub struct Simulation {
    system: Arc<System>,
    engine: Engine,
    law: NewtonianGravity,
    run: Option<ActiveRun>,
}

impl Simulation {
    pub fn new(records: &[BodyRecord], parameters: Parameters, engine: Engine) -> Result<Self, SimError> {
        engine.validate()?;
        let system = System::from_records(records, parameters.time_step)?;
        Ok(Self {
            system: Arc::new(system),
            engine,
            law: NewtonianGravity::new(engine.guard),
            run: None,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Switch strategy / integrator between runs
    pub fn set_engine(&mut self, engine: Engine) -> Result<(), SimError> {
        if self.run.is_some() {
            return Err(SimError::RunActive);
        }
        engine.validate()?;
        self.engine = engine;
        self.law = NewtonianGravity::new(engine.guard);
        Ok(())
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn time_step(&self) -> f64 {
        self.system.time_step
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Replace the body set and time step; any assignment is dropped with the old arena
    pub fn reset(&mut self, records: &[BodyRecord], time_step: f64) -> Result<(), SimError> {
        if self.run.is_some() {
            return Err(SimError::RunActive);
        }
        self.system = Arc::new(System::from_records(records, time_step)?);
        debug!("reset to {} bodies, dt = {time_step}", self.system.len());
        Ok(())
    }

    fn system_mut(&mut self) -> Result<&mut System, SimError> {
        if self.run.is_some() {
            return Err(SimError::RunActive);
        }
        Arc::get_mut(&mut self.system).ok_or(SimError::RunActive)
    }

    /// Advance one step on the calling thread
    ///
    /// `Parallel` uses the rayon pool, every other strategy takes a serial
    /// step (combined Euler or two-phase RK4).
    pub fn advance_one_step(&mut self) -> Result<(), SimError> {
        self.system_mut()?.assign_peers(PeerScheme::Full);
        self.caller_step();
        Ok(())
    }

    fn caller_step(&self) {
        let sys = &*self.system;
        let law = &self.law;
        match (self.engine.strategy, self.engine.integrator) {
            (Strategy::Parallel, integrator) => {
                let kind = if integrator == IntegratorKind::Rk4 { StepKind::Rk4 } else { StepKind::Euler };
                (0..sys.len()).into_par_iter().for_each(|i| kind.read(sys, i, law));
                (0..sys.len()).into_par_iter().for_each(|i| kind.commit(sys, i));
            }
            (_, IntegratorKind::Euler) => euler_integrator(sys, law),
            (_, IntegratorKind::Rk4) => rk4_integrator(sys, law),
        }
    }

    /// Run `steps` steps to completion under the configured strategy
    pub fn advance(&mut self, steps: u64) -> Result<RunReport, SimError> {
        if self.run.is_some() {
            return Err(SimError::RunActive);
        }
        let strategy = self.engine.strategy;
        if let Strategy::Stepped { .. } = strategy {
            return Err(SimError::Unsupported(
                "stepped runs wait for ticks; use start_workers".to_string(),
            ));
        }

        if steps == 0 {
            return Ok(self.report(1, 0, Duration::ZERO));
        }

        if strategy.is_threaded() {
            self.start_workers(StopCondition::AfterSteps(steps))?;
            return self.join_workers();
        }

        self.system_mut()?.assign_peers(PeerScheme::Full);
        let started = Instant::now();
        for _ in 0..steps {
            self.caller_step();
        }
        let workers = if strategy == Strategy::Parallel { rayon::current_num_threads() } else { 1 };
        let report = self.report(workers, steps, started.elapsed());
        info!("{strategy}/{} ran {steps} steps in {:?}", self.engine.integrator, report.elapsed);
        Ok(report)
    }

    fn report(&self, workers: usize, steps: u64, elapsed: Duration) -> RunReport {
        RunReport {
            strategy: self.engine.strategy,
            integrator: self.engine.integrator,
            workers,
            steps,
            elapsed,
        }
    }

    /// Partition the bodies and start the worker pool
    pub fn start_workers(&mut self, stop: StopCondition) -> Result<(), SimError> {
        if self.run.is_some() {
            return Err(SimError::RunActive);
        }
        let engine = self.engine;
        if !engine.strategy.is_threaded() {
            return Err(SimError::Unsupported(format!(
                "{} is driven by the caller; use advance",
                engine.strategy
            )));
        }

        let assignment = partition(self.system_mut()?, engine.workers, engine.strategy.partition_scheme())?;
        let workers = assignment.worker_count();
        let steps_per_cycle = match engine.strategy {
            Strategy::Stepped { steps_per_cycle } => Some(u64::from(steps_per_cycle)),
            _ => None,
        };

        let shared = Arc::new(WorkerShared {
            system: Arc::clone(&self.system),
            kind: StepKind::of(&engine),
            law: self.law,
            barrier_mode: engine.effective_barrier(),
            locks_commit: engine.strategy.locks_commit(),
            steps_per_cycle,
            stop,
            barrier: Barrier::new(workers),
            locks: (0..workers).map(|_| Mutex::new(())).collect(),
            gate: CycleGate::default(),
            token: CancellationToken::new(),
            stop_vote: AtomicU64::new(u64::MAX),
            aborted: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(workers);
        for (worker, bodies) in assignment.workers.into_iter().enumerate() {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("gravsim-worker-{worker}"))
                .spawn(move || run_worker(&worker_shared, worker, &bodies));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // release the already spawned workers from the start gate
                    shared.aborted.store(true, Ordering::Release);
                    shared.token.cancel();
                    shared.gate.wake();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(SimError::Spawn(err));
                }
            }
        }

        shared.gate.tick();
        info!(
            "started {workers} workers: {}/{} {:?} barrier, {stop:?}",
            engine.strategy,
            engine.integrator,
            engine.effective_barrier()
        );
        self.run = Some(ActiveRun {
            shared,
            handles,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Cancel the running workers and wait for them
    ///
    /// Workers finish the step they are in, so bodies are left at a step boundary.
    pub fn stop_workers(&mut self) -> Result<RunReport, SimError> {
        let run = self.run.as_ref().ok_or(SimError::NoActiveRun)?;
        run.shared.token.cancel();
        run.shared.gate.wake();
        self.join_workers()
    }

    /// Wait for the running workers to finish on their own
    ///
    /// Only returns for `UntilCancelled` runs once the token gets cancelled.
    pub fn join_workers(&mut self) -> Result<RunReport, SimError> {
        let run = self.run.take().ok_or(SimError::NoActiveRun)?;
        let workers = run.handles.len();
        let mut steps = 0;
        let mut failed = None;
        for (worker, handle) in run.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(done)) => steps = done,
                Ok(Err(err)) => {
                    failed.get_or_insert(err);
                }
                Err(_) => {
                    failed.get_or_insert(SimError::WorkerPanicked(worker));
                }
            }
        }
        let elapsed = run.started.elapsed();
        drop(run.shared);

        if let Some(err) = failed {
            warn!("run aborted after {steps} steps: {err}");
            return Err(err);
        }
        let report = self.report(workers, steps, elapsed);
        info!(
            "{}/{} stopped after {steps} steps in {elapsed:?}",
            report.strategy, report.integrator
        );
        Ok(report)
    }

    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.run.as_ref().map(|run| run.shared.token.clone())
    }

    /// Release cycle-gated workers for one more cycle
    pub fn tick(&self) -> Result<(), SimError> {
        let run = self.run.as_ref().ok_or(SimError::NoActiveRun)?;
        run.shared.gate.tick();
        trace!("cycle gate released");
        Ok(())
    }

    /// Hold every worker's commit lock, acquired in worker order
    pub fn pause(&self) -> Result<PauseGuard<'_>, SimError> {
        let run = self.run.as_ref().ok_or(SimError::NoActiveRun)?;
        if !run.shared.locks_commit {
            return Err(SimError::Unsupported(format!(
                "{} does not lock its commits",
                self.engine.strategy
            )));
        }
        Ok(PauseGuard {
            system: &run.shared.system,
            _locks: run.shared.locks.iter().map(|lock| lock.lock()).collect(),
        })
    }

    /// Positions read while every commit is blocked
    pub fn locked_snapshot(&self) -> Result<Vec<IVec2>, SimError> {
        let paused = self.pause()?;
        Ok(paused.positions())
    }

    /// Current positions in body order; may mix steps while workers run
    pub fn positions(&self) -> Vec<IVec2> {
        self.system.positions()
    }

    pub fn snapshot(&self) -> Vec<BodyRecord> {
        self.system.records()
    }

    pub fn names(&self) -> Vec<&str> {
        self.system.bodies.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn select(&self, name: &str) -> Result<&Body, SimError> {
        self.system.select(name)
    }

    pub fn position_of(&self, name: &str) -> Result<IVec2, SimError> {
        Ok(self.select(name)?.position.load())
    }

    /// Distance in meters between two named bodies
    pub fn distance(&self, a: &str, b: &str) -> Result<i64, SimError> {
        Ok(distance(self.position_of(a)?, self.position_of(b)?))
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.shared.token.cancel();
            run.shared.gate.wake();
            for handle in run.handles {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn records() -> Vec<BodyRecord> {
        (0..4)
            .map(|i| BodyRecord::new(&format!("b{i}"), 1.0e24, true, 0, [i * 1_000_000_000, 0], [0.0, 0.0]))
            .collect()
    }

    /// Run `drive` on a helper thread; a stranded worker pool shows up as a timeout
    fn finishes_within<F>(mut sim: Simulation, drive: F) -> Result<RunReport, SimError>
    where
        F: FnOnce(&mut Simulation) -> Result<RunReport, SimError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(drive(&mut sim));
        });
        rx.recv_timeout(Duration::from_secs(10))
            .expect("workers stranded on the barrier")
    }

    #[test]
    fn worker_panic_stops_the_whole_pool() {
        let strategies = [
            Strategy::Partitioned,
            Strategy::Locked,
            Strategy::Stepped { steps_per_cycle: 3 },
        ];
        for strategy in strategies {
            let engine = Engine::new(strategy, IntegratorKind::Euler).with_workers(2);
            let mut sim = Simulation::new(&records(), Parameters::default(), engine).unwrap();
            // body 1 belongs to worker 1 and now reads past the arena
            sim.system_mut().unwrap().bodies[1].peers.push(99);

            let result = finishes_within(sim, |sim| {
                sim.start_workers(StopCondition::AfterSteps(50))?;
                sim.join_workers()
            });
            assert!(
                matches!(result, Err(SimError::WorkerPanicked(1))),
                "{strategy}: {result:?}"
            );
        }
    }

    #[test]
    fn advance_reports_a_worker_panic() {
        let engine = Engine::new(Strategy::Partitioned, IntegratorKind::Rk4).with_workers(2);
        let mut sim = Simulation::new(&records(), Parameters::default(), engine).unwrap();
        sim.system_mut().unwrap().bodies[3].peers.push(99);

        let result = finishes_within(sim, |sim| sim.advance(20));
        assert!(matches!(result, Err(SimError::WorkerPanicked(1))));
    }
}
