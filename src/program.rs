//! Request-side domain types shared by the service, the hosts and the client.

use std::{
    collections::HashMap,
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use proto_api::language_pb::{GetRequiredPluginsRequest, RunRequest};

/// Locates a program for static inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInfo {
    pub project: String,
    pub pwd: String,
    pub program: String,
}

impl ProgramInfo {
    pub fn program_path(&self) -> PathBuf {
        resolve_program(&self.pwd, &self.program)
    }
}

impl From<GetRequiredPluginsRequest> for ProgramInfo {
    fn from(req: GetRequiredPluginsRequest) -> Self {
        Self {
            project: req.project,
            pwd: req.pwd,
            program: req.program,
        }
    }
}

impl From<ProgramInfo> for GetRequiredPluginsRequest {
    fn from(info: ProgramInfo) -> Self {
        Self {
            project: info.project,
            pwd: info.pwd,
            program: info.program,
        }
    }
}

/// Everything a host needs to execute a program once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub project: String,
    pub stack: String,
    pub pwd: String,
    pub program: String,
    pub args: Vec<String>,
    /// Flat key to serialized value. Values are opaque to the host.
    pub config: HashMap<String, String>,
    pub dry_run: bool,
    /// Raw value from the caller, passed through untouched. See
    /// [`RunInfo::parallelism`] for the interpreted form.
    pub parallel: i32,
    pub monitor_address: String,
}

impl RunInfo {
    pub fn program_path(&self) -> PathBuf {
        resolve_program(&self.pwd, &self.program)
    }

    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from(self.parallel)
    }

    /// Working directory for the program, `None` meaning inherit.
    pub fn working_dir(&self) -> Option<&Path> {
        if self.pwd.is_empty() {
            None
        } else {
            Some(Path::new(&self.pwd))
        }
    }
}

impl From<RunRequest> for RunInfo {
    fn from(req: RunRequest) -> Self {
        Self {
            project: req.project,
            stack: req.stack,
            pwd: req.pwd,
            program: req.program,
            args: req.args,
            config: req.config,
            dry_run: req.dry_run,
            parallel: req.parallel,
            monitor_address: req.monitor_address,
        }
    }
}

impl From<RunInfo> for RunRequest {
    fn from(info: RunInfo) -> Self {
        Self {
            project: info.project,
            stack: info.stack,
            pwd: info.pwd,
            program: info.program,
            args: info.args,
            config: info.config,
            dry_run: info.dry_run,
            parallel: info.parallel,
            monitor_address: info.monitor_address,
        }
    }
}

/// Concurrency ceiling for resource operations a program issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// No explicit parallelism requested; register resources one at a time.
    Serial,
    Bounded(NonZeroU32),
}

impl From<i32> for Parallelism {
    fn from(parallel: i32) -> Self {
        if parallel <= 1 {
            return Parallelism::Serial;
        }
        match NonZeroU32::new(parallel.unsigned_abs()) {
            Some(n) => Parallelism::Bounded(n),
            None => Parallelism::Serial,
        }
    }
}

impl Parallelism {
    pub fn is_serial(&self) -> bool {
        matches!(self, Parallelism::Serial)
    }

    pub fn max_in_flight(&self) -> u32 {
        match self {
            Parallelism::Serial => 1,
            Parallelism::Bounded(n) => n.get(),
        }
    }
}

/// Absolute programs are taken as-is, relative ones are joined to `pwd`.
/// An empty `pwd` anchors the program at the host's own directory, so a bare
/// name is never looked up on `PATH`.
pub fn resolve_program(pwd: &str, program: &str) -> PathBuf {
    let program = Path::new(program);
    if program.is_absolute() || program.as_os_str().is_empty() {
        return program.to_path_buf();
    }
    if pwd.is_empty() {
        return Path::new(".").join(program);
    }
    Path::new(pwd).join(program)
}
