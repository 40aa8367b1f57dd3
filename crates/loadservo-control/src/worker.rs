//! The controller loop.
//!
//! One `Worker` owns one control run: it holds the argument vector and
//! rewrites exactly one slot of it each cycle, drives the load process
//! lifecycle, and applies the proportional update. Nothing else may
//! touch the argument vector while a run is live.
//!
//! # Cycle
//!
//! ```text
//! substitute MV → spawn group → N fixed-rate samples → kill group
//!     ▲                                                    │
//!     └──────── MV += Kp × (SV − truncating mean) ─────────┘
//! ```
//!
//! The run has no natural termination; it ends only through the
//! shutdown channel (clean, `Ok(())`) or a fatal error.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::process::LoadProcess;
use crate::sampler::Sampler;
use crate::substitute::{apply_macro, resolve_macro};

/// One (MV, PV) pair, emitted per completed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub mv: i64,
    pub pv: u8,
}

/// Static configuration for one control run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Proportional gain applied to `sv - average_pv`.
    pub kp: i64,
    /// Set point for the process variable, 0 to 100.
    pub sv: u8,
    /// MV substituted into the first cycle.
    pub initial_mv: i64,
    /// Fixed sampling interval; one tick per sample.
    pub interval: Duration,
    /// Samples per cycle. One cycle lasts at least `interval × buffer_length`.
    pub buffer_length: usize,
    /// Placeholder token to locate in `args`.
    pub macro_token: String,
    /// The external load command.
    pub command: String,
    /// Its argument vector, containing the macro token exactly once
    /// (first occurrence wins if repeated).
    pub args: Vec<String>,
}

/// How a single observation window ended.
enum CycleOutcome {
    /// All samples taken.
    Completed,
    /// Shutdown observed mid-cycle; no sample emitted for the
    /// interrupted tick.
    Cancelled,
}

/// The long-lived owner of one control run.
#[derive(Debug)]
pub struct Worker {
    config: WorkerConfig,
    /// Resolved exactly once at construction, never re-scanned.
    macro_index: usize,
    sampler: Sampler,
    sink: mpsc::Sender<Observation>,
}

impl Worker {
    /// Validate the configuration and resolve the macro slot.
    ///
    /// Fails before anything is spawned if SV is out of range, the
    /// buffer is empty, the interval is zero, or the macro token is
    /// absent from the argument vector.
    pub fn new(
        config: WorkerConfig,
        sampler: Sampler,
        sink: mpsc::Sender<Observation>,
    ) -> ControlResult<Self> {
        if config.sv > 100 {
            return Err(ControlError::SetPointOutOfRange(config.sv));
        }
        if config.buffer_length == 0 {
            return Err(ControlError::EmptyBuffer);
        }
        if config.interval.is_zero() {
            return Err(ControlError::ZeroInterval);
        }
        let macro_index = resolve_macro(&config.args, &config.macro_token)?;

        Ok(Self {
            config,
            macro_index,
            sampler,
            sink,
        })
    }

    /// Drive the control loop until `shutdown` fires.
    ///
    /// Cancellation is honored between cycles and between samples; on
    /// observation the current process group is killed before return.
    /// The group kill is attempted on every exit path. The average is
    /// a truncating integer mean, and MV is deliberately unclamped —
    /// it may go negative or grow without bound.
    ///
    /// A full observation sink blocks the loop (deliberate
    /// backpressure); a dropped receiver is treated as "no observer
    /// attached" and samples are discarded.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ControlResult<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a fresh interval fires immediately;
        // consume it so every sample waits a full interval.
        ticker.tick().await;

        let mut buffer = vec![0u8; self.config.buffer_length];
        let mut mv = self.config.initial_mv;

        info!(
            command = %self.config.command,
            reporter = %self.sampler_uri(),
            sv = self.config.sv,
            kp = self.config.kp,
            mv,
            samples_per_cycle = self.config.buffer_length,
            "control loop starting"
        );

        loop {
            if *shutdown.borrow() {
                info!("control loop cancelled before cycle start");
                return Ok(());
            }

            apply_macro(&mut self.config.args, self.macro_index, mv);
            debug!(mv, args = ?self.config.args, "cycle starting");

            let process = LoadProcess::spawn(&self.config.command, &self.config.args)?;

            let outcome = self
                .observe_cycle(&mut buffer, mv, &mut ticker, &mut shutdown)
                .await;

            // The group dies on every path out of a cycle; the load
            // generator is not expected to exit on its own.
            let killed = process.kill_group().await;

            match outcome {
                Err(err) => {
                    // The sample failure outranks a kill failure.
                    if let Err(kill_err) = killed {
                        warn!(error = %kill_err, "group kill failed while aborting run");
                    }
                    return Err(err);
                }
                Ok(CycleOutcome::Cancelled) => {
                    killed?;
                    info!("control loop cancelled");
                    return Ok(());
                }
                Ok(CycleOutcome::Completed) => killed?,
            }

            let average_pv = truncating_mean(&buffer);
            let error = i64::from(self.config.sv) - i64::from(average_pv);
            mv = proportional_step(mv, self.config.kp, error);
            debug!(average_pv, error, next_mv = mv, "cycle complete");
        }
    }

    /// Take one cycle's worth of samples at the fixed rate.
    async fn observe_cycle(
        &self,
        buffer: &mut [u8],
        mv: i64,
        ticker: &mut Interval,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlResult<CycleOutcome> {
        for slot in buffer.iter_mut() {
            tokio::select! {
                _ = shutdown.changed() => {
                    return Ok(CycleOutcome::Cancelled);
                }
                result = async {
                    ticker.tick().await;
                    self.sampler.sample().await
                } => {
                    let pv = result?;
                    *slot = pv;
                    // A closed sink means no observer is attached; the
                    // run keeps going without telemetry.
                    let _ = self.sink.send(Observation { mv, pv }).await;
                }
            }
        }
        Ok(CycleOutcome::Completed)
    }

    fn sampler_uri(&self) -> String {
        self.sampler.uri().to_string()
    }
}

/// Truncating integer mean of a cycle's sample buffer.
///
/// Truncation (not round-to-nearest) is load-bearing: it changes the
/// steady-state oscillation near the set point, so it stays as-is.
fn truncating_mean(buffer: &[u8]) -> u8 {
    let sum: u64 = buffer.iter().map(|&v| u64::from(v)).sum();
    (sum / buffer.len() as u64) as u8
}

/// Pure proportional law: `mv + kp × error`, no clamping, no
/// integral or derivative terms.
fn proportional_step(mv: i64, kp: i64, error: i64) -> i64 {
    mv + kp * error
}
