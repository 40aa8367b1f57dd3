//! loadservo-control — closed-loop calibration of an external load generator.
//!
//! Drives a load-generating command (e.g. an HTTP benchmarking tool)
//! while sampling a process variable (PV) from a reporter endpoint,
//! and proportionally adjusts the manipulated variable (MV) written
//! into the command's argument vector until PV converges on the
//! operator's set point (SV).
//!
//! # Architecture
//!
//! ```text
//! Worker (one control run)
//!   │
//!   ├── per cycle:
//!   │   ├── substitute: args[macro_index] ← MV
//!   │   ├── LoadProcess::spawn (own process group)
//!   │   ├── Sampler::sample × buffer_length (fixed-rate ticks)
//!   │   │     └── RequestTemplate::clone_request per sample
//!   │   ├── LoadProcess::kill_group (SIGKILL, whole group)
//!   │   └── MV += Kp × (SV − truncating_mean(buffer))
//!   │
//!   └── Observation sink: one (MV, PV) per completed sample
//! ```
//!
//! The loop has no natural termination; it runs until the shutdown
//! channel flips. Every transport, protocol, or process failure is
//! fatal to the run — resilience policy belongs to the caller.

pub mod error;
pub mod process;
pub mod request;
pub mod sampler;
pub mod substitute;
pub mod worker;

pub use error::{ControlError, ControlResult};
pub use request::RequestTemplate;
pub use sampler::Sampler;
pub use worker::{Observation, Worker, WorkerConfig};
