//! Runs programs as child processes.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use proto_api::language_pb::PluginDependency;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::RuntimeConfig,
    host::LanguageHost,
    plugins::{self, DiscoveryError},
    program::{ProgramInfo, RunInfo},
};

pub const ENV_PROJECT: &str = "LANGHOST_PROJECT";
pub const ENV_STACK: &str = "LANGHOST_STACK";
pub const ENV_CONFIG: &str = "LANGHOST_CONFIG";
pub const ENV_DRY_RUN: &str = "LANGHOST_DRY_RUN";
pub const ENV_PARALLEL: &str = "LANGHOST_PARALLEL";
pub const ENV_MONITOR: &str = "LANGHOST_MONITOR";

/// Number of trailing stderr lines kept for the error report.
const STDERR_TAIL_LINES: usize = 20;

/// Grandchildren may keep stderr open after the program itself exits.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment handed to the program describing the run.
pub fn program_env(info: &RunInfo) -> Result<Vec<(&'static str, String)>> {
    let config = serde_json::to_string(&info.config).context("failed to serialize config")?;
    Ok(vec![
        (ENV_PROJECT, info.project.clone()),
        (ENV_STACK, info.stack.clone()),
        (ENV_CONFIG, config),
        (ENV_DRY_RUN, info.dry_run.to_string()),
        (ENV_PARALLEL, info.parallel.to_string()),
        (ENV_MONITOR, info.monitor_address.clone()),
    ])
}

/// Language host that spawns each program as a child process, optionally
/// through an interpreter.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    config: RuntimeConfig,
}

impl ProcessHost {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Absolute path of the program. The child runs with `pwd` as its
    /// working directory, so a relative path would be resolved twice.
    fn executable(&self, info: &RunInfo) -> Result<PathBuf> {
        let program = info.program_path();
        std::path::absolute(&program)
            .with_context(|| format!("failed to resolve program {}", program.display()))
    }

    fn command(&self, program: &Path, info: &RunInfo) -> Result<Command> {
        let mut cmd = match &self.config.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.args(&self.config.interpreter_args).arg(program);
                cmd
            }
            None => Command::new(program),
        };
        cmd.args(&info.args);
        if let Some(dir) = info.working_dir() {
            cmd.current_dir(dir);
        }
        cmd.envs(program_env(info)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination reaches everything the program
        // started.
        #[cfg(unix)]
        cmd.process_group(0);

        Ok(cmd)
    }

    /// SIGTERM to the program's process group, then SIGKILL once the grace
    /// period runs out or the program itself has exited.
    async fn terminate(&self, child: &mut Child, program: &Path) {
        let pid = child.id();

        #[cfg(unix)]
        if let Some(pid) = pid {
            signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        }

        match tokio::time::timeout(self.config.termination_grace(), child.wait()).await {
            Ok(Ok(status)) => {
                info!(
                    program = %program.display(),
                    pid = ?pid,
                    status = ?status,
                    "program terminated"
                );
            }
            Ok(Err(e)) => {
                warn!(program = %program.display(), error = ?e, "error waiting for program");
            }
            Err(_) => {
                warn!(
                    program = %program.display(),
                    pid = ?pid,
                    "program did not terminate gracefully, forcing kill"
                );
                if let Err(e) = child.kill().await {
                    warn!(program = %program.display(), error = ?e, "failed to kill program");
                }
            }
        }

        // Stragglers left in the group after the leader is gone.
        #[cfg(unix)]
        if let Some(pid) = pid {
            signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!(pid = pid, signal = ?signal, error = %e, "failed to signal process group"),
    }
}

enum Completion {
    Exited(ExitStatus),
    Cancelled,
    TimedOut(Duration),
}

#[async_trait]
impl LanguageHost for ProcessHost {
    async fn required_plugins(
        &self,
        program: &ProgramInfo,
    ) -> Result<Vec<PluginDependency>, DiscoveryError> {
        plugins::discover(&program.program_path(), &self.config.plugin_manifest).await
    }

    async fn run(&self, info: RunInfo, cancel: CancellationToken) -> Result<()> {
        let program = self.executable(&info)?;
        let mut child = self
            .command(&program, &info)?
            .spawn()
            .with_context(|| format!("failed to launch program {}", program.display()))?;

        info!(
            program = %program.display(),
            pid = ?child.id(),
            dry_run = info.dry_run,
            parallel = info.parallel,
            max_in_flight = info.parallelism().max_in_flight(),
            "program started"
        );

        if let Some(stdout) = child.stdout.take() {
            let program = program.clone();
            tokio::spawn(async move {
                forward_stdout(stdout, program).await;
            });
        }
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_stderr(stderr, program.clone())));

        let timeout = self.config.run_timeout();
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let completion = tokio::select! {
            status = child.wait() => {
                Completion::Exited(status.context("failed waiting for program")?)
            }
            _ = cancel.cancelled() => Completion::Cancelled,
            _ = deadline => Completion::TimedOut(timeout.unwrap_or_default()),
        };

        match completion {
            Completion::Exited(status) => {
                let tail = join_tail(stderr_tail).await;
                if status.success() {
                    info!(program = %program.display(), "program completed");
                    return Ok(());
                }
                Err(exit_error(&program, status, &tail))
            }
            Completion::Cancelled => {
                self.terminate(&mut child, &program).await;
                Err(anyhow::anyhow!(
                    "execution of {} was cancelled",
                    program.display()
                ))
            }
            Completion::TimedOut(timeout) => {
                self.terminate(&mut child, &program).await;
                Err(anyhow::anyhow!(
                    "execution of {} timed out after {}s",
                    program.display(),
                    timeout.as_secs()
                ))
            }
        }
    }
}

fn exit_error(program: &Path, status: ExitStatus, stderr_tail: &[String]) -> anyhow::Error {
    let mut message = format!("program {} exited with {}", program.display(), status);
    if !stderr_tail.is_empty() {
        message.push_str(":\n");
        message.push_str(&stderr_tail.join("\n"));
    }
    anyhow::anyhow!(message)
}

async fn join_tail(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await {
        Ok(tail) => tail.unwrap_or_default(),
        Err(_) => {
            debug!("stderr still open after program exit");
            Vec::new()
        }
    }
}

async fn forward_stdout<R>(stream: R, program: PathBuf)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(program = %program.display(), "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stdout forwarding ended");
                break;
            }
        }
    }
}

async fn collect_stderr<R>(stream: R, program: PathBuf) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                warn!(program = %program.display(), "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stderr forwarding ended");
                break;
            }
        }
    }
    tail.into()
}
