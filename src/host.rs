//! The seam between the gRPC service and whatever actually inspects and
//! executes programs.

use std::{future::Future, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use proto_api::language_pb::PluginDependency;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    plugins::DiscoveryError,
    program::{ProgramInfo, RunInfo},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A language runtime implementation.
///
/// Implementations hold no per-call state: the service may invoke any
/// method concurrently with any other.
#[async_trait]
pub trait LanguageHost: Send + Sync + 'static {
    /// Plugins the program needs, found without executing it. Must be
    /// stable for identical inputs.
    async fn required_plugins(
        &self,
        program: &ProgramInfo,
    ) -> Result<Vec<PluginDependency>, DiscoveryError>;

    /// Execute the program to completion. `cancel` fires when the caller
    /// gives up on the run or the host shuts down; the implementation must
    /// then stop the program and return promptly.
    async fn run(&self, info: RunInfo, cancel: CancellationToken) -> Result<()>;

    fn version(&self) -> String {
        VERSION.to_string()
    }
}

type ProgramFn = dyn Fn(RunInfo, CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// In-process language host whose "program" is a closure.
///
/// Lets an orchestrator be exercised against programs that succeed, fail or
/// panic without spawning anything.
#[derive(Clone)]
pub struct CallbackHost {
    program: Arc<ProgramFn>,
    plugins: Vec<PluginDependency>,
    version: String,
}

impl CallbackHost {
    pub fn new<F, Fut>(program: F) -> Self
    where
        F: Fn(RunInfo, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let program: Arc<ProgramFn> =
            Arc::new(move |info: RunInfo, cancel: CancellationToken| program(info, cancel).boxed());
        Self {
            program,
            plugins: Vec::new(),
            version: VERSION.to_string(),
        }
    }

    /// Plugins reported by `required_plugins`, in this order.
    pub fn with_plugins(mut self, plugins: Vec<PluginDependency>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

#[async_trait]
impl LanguageHost for CallbackHost {
    async fn required_plugins(
        &self,
        _program: &ProgramInfo,
    ) -> Result<Vec<PluginDependency>, DiscoveryError> {
        Ok(self.plugins.clone())
    }

    async fn run(&self, info: RunInfo, cancel: CancellationToken) -> Result<()> {
        info!(program = %info.program, dry_run = info.dry_run, "running callback program");
        (self.program)(info, cancel).await
    }

    fn version(&self) -> String {
        self.version.clone()
    }
}
