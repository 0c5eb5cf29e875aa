//! Repeated-trial benchmark across engines.
//!
//! Each trial renders the canonical view once per engine at a fixed
//! resolution. Every run is appended to the long-lived history and to a
//! transient session set; the session set yields the per-engine averages
//! and is cleared when the benchmark ends.
//!
//! An engine that fails is dropped from the remaining trials and reported;
//! the others run to completion.
//!
//! Progress is reported as [`BenchmarkEvent`] messages over a channel with
//! a single consumer, typically whatever thread owns the display.

use crate::error::RenderError;
use crate::history::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
use crate::model::{resolution_label, EngineKind, RenderRequest};
use crate::stats::{ComputationRecord, StatsAggregator};
use crate::traits::Engine;
use crate::viewport::canonical_view;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, info, warn};
use std::thread::JoinHandle;

/// Benchmark configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    pub width: u32,
    pub height: u32,
    /// Number of passes over all engines.
    pub trials: usize,
    pub max_iterations: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            width: CANONICAL_WIDTH,
            height: CANONICAL_HEIGHT,
            trials: 3,
            max_iterations: 1000,
        }
    }
}

/// An engine that stopped partway through a benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFailure {
    pub engine: EngineKind,
    /// Zero-based trial the failure happened in.
    pub trial: usize,
    pub message: String,
}

/// Per-engine averages of one benchmark session.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSummary {
    pub resolution: String,
    pub trials: usize,
    /// Mean elapsed milliseconds per engine that completed every trial, in
    /// benchmark order.
    pub averages: Vec<(EngineKind, f64)>,
    /// Engines dropped after an error; they have no average.
    pub failures: Vec<EngineFailure>,
}

impl BenchmarkSummary {
    /// Average for `engine`, if it completed every trial.
    pub fn average_for(&self, engine: EngineKind) -> Option<f64> {
        self.averages
            .iter()
            .find(|(kind, _)| *kind == engine)
            .map(|(_, ms)| *ms)
    }

    /// Whether every engine completed every trial.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Progress messages sent while a benchmark runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkEvent {
    Started { total_runs: usize },
    RunCompleted {
        trial: usize,
        engine: EngineKind,
        elapsed_ms: f64,
    },
    /// One engine failed and takes no further part.
    EngineFailed(EngineFailure),
    Finished(BenchmarkSummary),
    Failed { message: String },
}

/// Benchmark runner holding the transient session set.
#[derive(Debug, Clone, Default)]
pub struct Benchmark {
    config: BenchmarkConfig,
    session: Vec<ComputationRecord>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            session: Vec::new(),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Records in the current session; empty outside `run`.
    pub fn session_len(&self) -> usize {
        self.session.len()
    }

    /// Runs every trial over every engine, appending each run to `history`.
    ///
    /// Engines are reset before each run so every trial pays full setup
    /// cost. A failing engine is skipped for the remaining trials. Errors are
    /// returned only for an invalid configuration. The session set is
    /// cleared on return.
    pub fn run(
        &mut self,
        engines: &mut [Box<dyn Engine>],
        history: &mut StatsAggregator,
        events: &Sender<BenchmarkEvent>,
    ) -> Result<BenchmarkSummary, RenderError> {
        let result = self.run_trials(engines, history, events);
        self.session.clear();

        match &result {
            Ok(summary) => {
                events.send(BenchmarkEvent::Finished(summary.clone())).ok();
            }
            Err(err) => {
                events
                    .send(BenchmarkEvent::Failed {
                        message: err.to_string(),
                    })
                    .ok();
            }
        }
        result
    }

    fn run_trials(
        &mut self,
        engines: &mut [Box<dyn Engine>],
        history: &mut StatsAggregator,
        events: &Sender<BenchmarkEvent>,
    ) -> Result<BenchmarkSummary, RenderError> {
        let config = &self.config;
        if config.trials == 0 {
            return Err(RenderError::InvalidTrials);
        }
        let request = RenderRequest::new(
            config.width,
            config.height,
            canonical_view(config.width),
            config.max_iterations,
        )?;
        let label = resolution_label(config.width, config.height);
        let mut buffer = vec![0u32; request.pixel_count()];

        info!(
            "benchmark: {} trials x {} engines at {}",
            config.trials,
            engines.len(),
            label
        );
        events
            .send(BenchmarkEvent::Started {
                total_runs: config.trials * engines.len(),
            })
            .ok();

        let mut active = vec![true; engines.len()];
        let mut failures = Vec::new();
        for trial in 0..config.trials {
            for (slot, engine) in engines.iter_mut().enumerate() {
                if !active[slot] {
                    continue;
                }
                let kind = engine.kind();
                match run_once(engine.as_mut(), &request, &mut buffer) {
                    Ok(elapsed_ms) => {
                        let record = ComputationRecord::new(elapsed_ms, label.clone(), kind);
                        debug!("trial {}: {}", trial + 1, record);

                        history.record(record.clone());
                        self.session.push(record);
                        events
                            .send(BenchmarkEvent::RunCompleted {
                                trial,
                                engine: kind,
                                elapsed_ms,
                            })
                            .ok();
                    }
                    Err(err) => {
                        warn!(
                            "{} failed in trial {}, dropping it from the benchmark: {}",
                            kind,
                            trial + 1,
                            err
                        );
                        active[slot] = false;
                        let failure = EngineFailure {
                            engine: kind,
                            trial,
                            message: err.to_string(),
                        };
                        events.send(BenchmarkEvent::EngineFailed(failure.clone())).ok();
                        failures.push(failure);
                    }
                }
            }
        }

        Ok(self.summarize(engines, label, failures))
    }

    /// Running total per engine divided by the trial count, for engines
    /// that never failed.
    fn summarize(
        &self,
        engines: &[Box<dyn Engine>],
        resolution: String,
        failures: Vec<EngineFailure>,
    ) -> BenchmarkSummary {
        let trials = self.config.trials as f64;
        let mut averages: Vec<(EngineKind, f64)> = Vec::new();
        for engine in engines {
            let kind = engine.kind();
            if averages.iter().any(|(k, _)| *k == kind)
                || failures.iter().any(|f| f.engine == kind)
            {
                continue;
            }
            let total: f64 = self
                .session
                .iter()
                .filter(|r| r.engine == kind)
                .map(|r| r.elapsed_ms / trials)
                .sum();
            averages.push((kind, total));
        }
        BenchmarkSummary {
            resolution,
            trials: self.config.trials,
            averages,
            failures,
        }
    }
}

fn run_once(
    engine: &mut dyn Engine,
    request: &RenderRequest,
    buffer: &mut [u32],
) -> Result<f64, RenderError> {
    engine.reset()?;
    engine.render(request, buffer)
}

/// What a background benchmark hands back when it finishes.
pub struct BenchmarkOutcome {
    pub history: StatsAggregator,
    pub engines: Vec<Box<dyn Engine>>,
    pub result: Result<BenchmarkSummary, RenderError>,
}

/// A benchmark running on its own thread.
pub struct BenchmarkHandle {
    events: Receiver<BenchmarkEvent>,
    thread: JoinHandle<BenchmarkOutcome>,
}

impl BenchmarkHandle {
    /// Progress messages; the run has ended once `Finished` or `Failed` arrives.
    pub fn events(&self) -> &Receiver<BenchmarkEvent> {
        &self.events
    }

    /// Waits for the benchmark thread and returns the engines and history it owned.
    pub fn join(self) -> std::thread::Result<BenchmarkOutcome> {
        self.thread.join()
    }
}

/// Runs a benchmark in the background. Not cancellable; it runs to completion.
pub fn spawn(
    config: BenchmarkConfig,
    mut engines: Vec<Box<dyn Engine>>,
    mut history: StatsAggregator,
) -> BenchmarkHandle {
    let (tx, rx) = channel::unbounded();
    let thread = std::thread::spawn(move || {
        let mut benchmark = Benchmark::new(config);
        let result = benchmark.run(&mut engines, &mut history, &tx);
        BenchmarkOutcome {
            history,
            engines,
            result,
        }
    });
    BenchmarkHandle { events: rx, thread }
}
