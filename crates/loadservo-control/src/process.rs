//! Load-generator process lifecycle.
//!
//! The external command is spawned once per cycle into its own process
//! group. Termination signals the whole group: load-generating tools
//! commonly fork worker subprocesses, and killing only the immediate
//! child would leak them between cycles.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{ControlError, ControlResult};

/// A running load-generator, leader of its own process group.
#[derive(Debug)]
pub struct LoadProcess {
    child: Child,
    pgid: i32,
}

impl LoadProcess {
    /// Start `command` with `args` in a fresh process group.
    ///
    /// stdout/stderr are inherited — the load tool's own output is not
    /// part of the control signal. Spawn failure (executable missing,
    /// fork failure) is fatal to the run.
    pub fn spawn(command: &str, args: &[String]) -> ControlResult<Self> {
        let child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| ControlError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // With process_group(0) the child leads its own group, so the
        // pgid equals the child pid. Recorded now because the pid is
        // gone from the handle once the child is reaped.
        let pgid = match child.id() {
            Some(id) => id as i32,
            None => {
                return Err(ControlError::Spawn {
                    command: command.to_string(),
                    source: std::io::Error::other("child had no pid after spawn"),
                })
            }
        };

        debug!(%command, pgid, "load command started");
        Ok(Self { child, pgid })
    }

    /// The process group id, equal to the direct child's pid.
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// SIGKILL the entire process group, then reap the direct child.
    ///
    /// Unconditional: the load generator is not expected to exit on
    /// its own within a cycle. Kill failure is fatal — the controller
    /// cannot proceed with an unknown-state orphan group.
    pub async fn kill_group(mut self) -> ControlResult<()> {
        let ret = unsafe { libc::killpg(self.pgid, libc::SIGKILL) };
        if ret != 0 {
            let source = std::io::Error::last_os_error();
            // ESRCH: the whole group already exited; nothing to orphan.
            if source.raw_os_error() != Some(libc::ESRCH) {
                return Err(ControlError::Kill {
                    pgid: self.pgid,
                    source,
                });
            }
        }
        let _ = self.child.wait().await;
        debug!(pgid = self.pgid, "load process group killed");
        Ok(())
    }
}
