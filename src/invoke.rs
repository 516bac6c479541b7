//! Synchronous external tool invocation with durable run logs.
//!
//! The invoker never judges success: it reports the exit code (or its
//! absence) and leaves the decision to the caller. A log is written for
//! every invocation, including spawn failures and timeouts.
use crate::error::{SweepError, SweepResult};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A fully expanded command ready to launch.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Label used in logs and errors (`geometry`, `solver`).
    pub tool: String,
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Shell-quoted command line for logs.
    pub fn command_line(&self) -> String {
        let args = self.args.iter().map(String::as_str);
        shell_words::join(std::iter::once(self.program.as_str()).chain(args))
    }
}

/// Captured outcome of one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// `None` when the process timed out, was killed by a signal, or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub spawn_error: Option<String>,
    /// Set when the child started but waiting on it failed.
    pub wait_error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
            && !self.timed_out
            && self.spawn_error.is_none()
            && self.wait_error.is_none()
    }

    /// Human-readable reason for a non-successful result.
    pub fn failure_reason(&self) -> String {
        if let Some(err) = &self.spawn_error {
            return format!("spawn failed: {err}");
        }
        if let Some(err) = &self.wait_error {
            return format!("wait failed: {err}");
        }
        if self.timed_out {
            return format!("timed out after {:.1}s", self.duration_ms as f64 / 1000.0);
        }
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run `invocation` to completion and write its log to `log_path`.
pub fn invoke(invocation: &Invocation, log_path: &Path) -> SweepResult<ExecutionResult> {
    let started_at = jiff::Timestamp::now();
    let start = Instant::now();
    tracing::debug!(
        tool = %invocation.tool,
        command = %invocation.command_line(),
        workdir = %invocation.workdir.display(),
        "launching external tool"
    );

    let log_err = |err: std::io::Error| SweepError::archive(log_path, err);
    let mut stdout_file = tempfile::tempfile().map_err(log_err)?;
    let mut stderr_file = tempfile::tempfile().map_err(log_err)?;

    let mut result = ExecutionResult {
        exit_code: None,
        timed_out: false,
        spawn_error: None,
        wait_error: None,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 0,
    };
    match spawn(invocation, &stdout_file, &stderr_file) {
        Ok(mut child) => match wait_bounded(&mut child, invocation.timeout) {
            Ok((status, timed_out)) => {
                result.timed_out = timed_out;
                result.exit_code = if timed_out { None } else { status.code() };
            }
            Err(err) => {
                kill_tree(&mut child);
                let _ = child.wait();
                result.wait_error = Some(err.to_string());
            }
        },
        Err(err) => result.spawn_error = Some(err.to_string()),
    }
    result.duration_ms = start.elapsed().as_millis();
    result.stdout = read_capture(&mut stdout_file).map_err(log_err)?;
    result.stderr = read_capture(&mut stderr_file).map_err(log_err)?;
    if result.spawn_error.is_some() || result.wait_error.is_some() {
        result.stderr.push_str(&format!("{}\n", result.failure_reason()));
    }

    let finished_at = jiff::Timestamp::now();
    write_log(log_path, invocation, &result, started_at, finished_at)?;

    if result.success() {
        tracing::info!(
            tool = %invocation.tool,
            duration_ms = result.duration_ms as u64,
            "tool finished"
        );
    } else {
        tracing::warn!(
            tool = %invocation.tool,
            reason = %result.failure_reason(),
            log = %log_path.display(),
            "tool did not succeed"
        );
    }
    Ok(result)
}

fn spawn(invocation: &Invocation, stdout: &File, stderr: &File) -> std::io::Result<Child> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(&invocation.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?));
    // Own process group so a timeout can take down the whole batch pipeline.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.spawn()
}

/// Kill `child` together with everything it started.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group was created at spawn.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Wait for `child`, killing it once `timeout` elapses. The flag reports a kill.
fn wait_bounded(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait()?, false));
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if start.elapsed() > timeout {
            kill_tree(child);
            let status = child.wait()?;
            return Ok((status, true));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_capture(file: &mut File) -> std::io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_log(
    log_path: &Path,
    invocation: &Invocation,
    result: &ExecutionResult,
    started_at: jiff::Timestamp,
    finished_at: jiff::Timestamp,
) -> SweepResult<()> {
    let exit_line = match result.exit_code {
        Some(code) => code.to_string(),
        None => format!("none ({})", result.failure_reason()),
    };
    let mut text = String::new();
    text.push_str(&format!("=== RUN START: {started_at} ===\n"));
    text.push_str(&format!("Tool: {}\n", invocation.tool));
    text.push_str(&format!("Workdir: {}\n", invocation.workdir.display()));
    text.push_str(&format!("Command: {}\n", invocation.command_line()));
    text.push_str(&format!("Exit code: {exit_line}\n"));
    text.push_str(&format!("Duration: {} ms\n\n", result.duration_ms));
    text.push_str("=== STDOUT ===\n");
    text.push_str(&result.stdout);
    text.push_str("\n=== STDERR ===\n");
    text.push_str(&result.stderr);
    text.push_str(&format!("\n=== RUN END: {finished_at} ===\n"));

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|err| SweepError::archive(parent, err))?;
    }
    fs::write(log_path, text.as_bytes()).map_err(|err| SweepError::archive(log_path, err))?;
    Ok(())
}
