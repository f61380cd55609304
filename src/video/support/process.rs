//! Child-process supervision shared by the transcoder runner and the probe.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

use crate::ui::prelude::{Level, emit};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Time between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Spawn `command` as the leader of a new process group so a timeout can
/// take down everything it started.
pub fn spawn_in_group(command: &mut Command, tool: &str) -> Result<Child> {
    command
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to spawn {tool}"))
}

/// Wait for `child` up to `timeout`.
///
/// Returns `None` when the budget ran out; the process group has then been
/// sent SIGTERM, given [`TERMINATE_GRACE`], and killed if still alive.
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("Failed to poll child process")? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            terminate(child, TERMINATE_GRACE)?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM the child's group, then SIGKILL after `grace`.
pub fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
    let group = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(group, Signal::SIGTERM) {
        emit(
            Level::Debug,
            "process.terminate.sigterm_failed",
            &format!("SIGTERM to process group {group} failed: {err}"),
            None,
        );
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.try_wait().context("Failed to poll child process")?.is_some() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }

    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.kill();
    child.wait().context("Failed to reap killed child process")?;
    Ok(())
}

/// Read a pipe to the end on a background thread.
pub fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn finished_process_reports_status() {
        let mut child = spawn_in_group(Command::new("true").stdout(Stdio::null()), "true").unwrap();
        let status = wait_with_timeout(&mut child, Duration::from_secs(10)).unwrap();
        assert!(status.unwrap().success());
    }

    #[test]
    fn overdue_process_is_terminated() {
        let mut child = spawn_in_group(Command::new("sleep").arg("30"), "sleep").unwrap();
        let started = Instant::now();
        let status = wait_with_timeout(&mut child, Duration::from_millis(200)).unwrap();
        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(child.try_wait().unwrap().is_some());
    }
}
