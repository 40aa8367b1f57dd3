//! loadservo — closed-loop load calibrator.
//!
//! Drives an external load generator while sampling a process
//! variable from an HTTP reporter, proportionally adjusting the value
//! substituted for the macro token until the reported value converges
//! on the set point.
//!
//! # Usage
//!
//! ```text
//! loadservo --kp 10000 -i 1000 -l 5 http://target:6000/cpu \
//!     "hey -c 10 -n 100000 -q % http://example.com"
//! ```
//!
//! The reporter must answer with a plain-text integer in 0–100; the
//! `%` slot of the load command is rewritten with the current MV each
//! cycle.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;

use loadservo_control::{Observation, Sampler, Worker, WorkerConfig};

mod request;

#[derive(Parser, Debug)]
#[command(
    name = "loadservo",
    about = "Closed-loop load calibrator — tunes a load generator until a reported metric hits the set point",
    version
)]
pub struct Cli {
    /// HTTP method for the reporter request.
    #[arg(short = 'm', default_value = "GET")]
    pub method: String,

    /// Reporter request body.
    #[arg(short = 'd', default_value = "")]
    pub body: String,

    /// File whose contents become the request body (overrides -d).
    #[arg(short = 'D', value_name = "FILE")]
    pub body_file: Option<PathBuf>,

    /// Accept header.
    #[arg(short = 'A')]
    pub accept: Option<String>,

    /// Content-Type header.
    #[arg(short = 'T', default_value = "text/plain")]
    pub content_type: String,

    /// Custom header, repeatable ("Name: value").
    #[arg(short = 'H', value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Basic auth as "username:password".
    #[arg(short = 'a', value_name = "USER:PASS")]
    pub auth: Option<String>,

    /// Host header override.
    #[arg(long)]
    pub host: Option<String>,

    /// User agent, prefixed to the tool's own.
    #[arg(short = 'U')]
    pub user_agent: Option<String>,

    /// Reporter request timeout in seconds.
    #[arg(short = 't', default_value = "20")]
    pub timeout: u64,

    /// Proportional control gain.
    #[arg(long, default_value = "10000", allow_negative_numbers = true)]
    pub kp: i64,

    /// Set point for the reported value (0–100).
    #[arg(long, default_value = "50")]
    pub sv: u8,

    /// Initial manipulated value substituted for the macro.
    #[arg(long = "mv", default_value = "1000", allow_negative_numbers = true)]
    pub initial_mv: i64,

    /// Sampling interval in milliseconds.
    #[arg(short = 'i', default_value = "1000", value_name = "MS")]
    pub interval_ms: u64,

    /// Samples per control cycle.
    #[arg(short = 'l', default_value = "5")]
    pub buffer_length: usize,

    /// Macro token rewritten with the MV each cycle.
    #[arg(long = "macro", default_value = "%")]
    pub macro_token: String,

    /// Reporter URL answering the process variable as plain-text 0–100.
    pub reporter_url: String,

    /// Load command line; exactly one argument must be the macro token.
    pub command: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loadservo=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let template = request::build_template(&cli).context("failed to build reporter request")?;
    let (command, args) = request::split_command(&cli.command)?;

    let sampler = Sampler::new(template, Duration::from_secs(cli.timeout));

    // Observer: logs every (MV, PV) pair. The channel is bounded; the
    // control loop blocks if this consumer ever falls 64 samples
    // behind.
    let (obs_tx, mut obs_rx) = mpsc::channel::<Observation>(64);
    let observer = tokio::spawn(async move {
        while let Some(Observation { mv, pv }) = obs_rx.recv().await {
            info!(mv, pv, "sample");
        }
    });

    let config = WorkerConfig {
        kp: cli.kp,
        sv: cli.sv,
        initial_mv: cli.initial_mv,
        interval: Duration::from_millis(cli.interval_ms),
        buffer_length: cli.buffer_length,
        macro_token: cli.macro_token.clone(),
        command,
        args,
    };
    let mut worker = Worker::new(config, sampler, obs_tx).context("worker validation failed")?;

    // Ctrl-C → cooperative cancellation; the worker kills the current
    // process group before returning.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping control loop");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = worker.run(shutdown_rx).await;

    // Dropping the worker closes the sink, letting the observer drain
    // and exit.
    drop(worker);
    let _ = observer.await;

    result.context("control run failed")
}
