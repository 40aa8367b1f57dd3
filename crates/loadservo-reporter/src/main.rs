//! cpu-reporter — a sample process-variable endpoint for loadservo.
//!
//! `GET /cpu` answers the system-wide CPU utilisation since the
//! previous request as a plain-text integer in 0–100, which is exactly
//! the wire contract the loadservo sampler expects. `GET /ping`
//! answers `pong` for liveness checks.
//!
//! Utilisation comes from deltas of the aggregate line of /proc/stat,
//! so this binary is Linux-only (as is loadservo's process-group
//! kill).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cpu-reporter", about = "Serves CPU utilisation as a plain-text integer")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "6000")]
    port: u16,
}

/// Cumulative jiffies from the aggregate /proc/stat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    idle: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.busy + self.idle
    }
}

/// Previous reading plus the last utilisation served, reused when two
/// requests land inside the same jiffy.
struct CpuTracker {
    last: Mutex<(CpuTimes, u8)>,
}

/// Parse the aggregate "cpu  ..." line of /proc/stat.
///
/// Fields are user nice system idle iowait irq softirq steal [...].
/// idle + iowait count as idle time, everything else as busy.
fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.map_while(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let busy: u64 = values
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 3 && *i != 4)
        .map(|(_, v)| *v)
        .sum();
    Some(CpuTimes { busy, idle })
}

fn read_cpu_times() -> std::io::Result<CpuTimes> {
    let stat = std::fs::read_to_string("/proc/stat")?;
    stat.lines()
        .next()
        .and_then(parse_cpu_line)
        .ok_or_else(|| std::io::Error::other("unparseable /proc/stat"))
}

/// Utilisation over the window between two readings, in 0–100.
fn utilisation(prev: CpuTimes, cur: CpuTimes) -> Option<u8> {
    let total = cur.total().checked_sub(prev.total())?;
    if total == 0 {
        return None;
    }
    let busy = cur.busy.saturating_sub(prev.busy);
    Some((busy * 100 / total).min(100) as u8)
}

async fn cpu_handler(State(tracker): State<Arc<CpuTracker>>) -> Result<String, StatusCode> {
    let cur = read_cpu_times().map_err(|e| {
        warn!(error = %e, "failed to read /proc/stat");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut last = tracker.last.lock().expect("cpu tracker lock poisoned");
    let (prev, prev_pct) = *last;
    let pct = utilisation(prev, cur).unwrap_or(prev_pct);
    *last = (cur, pct);
    Ok(pct.to_string())
}

async fn ping_handler() -> &'static str {
    "pong"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    // Baseline reading so the first /cpu request measures a real
    // window instead of boot-to-now.
    let initial = read_cpu_times()?;
    let tracker = Arc::new(CpuTracker {
        last: Mutex::new((initial, 0)),
    });

    let router = Router::new()
        .route("/cpu", get(cpu_handler))
        .route("/ping", get(ping_handler))
        .with_state(tracker);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!(%addr, "cpu-reporter listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
