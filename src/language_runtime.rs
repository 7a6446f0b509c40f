//! gRPC adapter exposing a [`LanguageHost`] as the `LanguageRuntime` service.

use std::{any::Any, sync::Arc};

use proto_api::language_pb::{
    language_runtime_server::LanguageRuntime,
    GetRequiredPluginsRequest,
    GetRequiredPluginsResponse,
    PluginInfo,
    RunRequest,
    RunResponse,
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    host::LanguageHost,
    program::{ProgramInfo, RunInfo},
};

pub struct LanguageRuntimeService<H> {
    host: Arc<H>,
    shutdown: CancellationToken,
}

impl<H: LanguageHost> LanguageRuntimeService<H> {
    /// Runs in flight when `shutdown` fires are cancelled.
    pub fn new(host: H, shutdown: CancellationToken) -> Self {
        Self {
            host: Arc::new(host),
            shutdown,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message;
    }
    "non-string panic payload"
}

/// Description of a run that ended in a join error. Never empty.
fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        return format!("program panicked: {}", panic_message(payload.as_ref()));
    }
    format!("program execution was aborted: {err}")
}

/// Description of a failed run. Never empty, so callers can tell a failure
/// from success by `error.is_empty()` alone.
fn failure_message(err: &anyhow::Error) -> String {
    let message = format!("{err:#}");
    if message.trim().is_empty() {
        return "program failed without an error message".to_string();
    }
    message
}

#[tonic::async_trait]
impl<H: LanguageHost> LanguageRuntime for LanguageRuntimeService<H> {
    async fn get_required_plugins(
        &self,
        request: Request<GetRequiredPluginsRequest>,
    ) -> Result<Response<GetRequiredPluginsResponse>, Status> {
        let program = ProgramInfo::from(request.into_inner());

        match self.host.required_plugins(&program).await {
            Ok(plugins) => {
                info!(
                    project = %program.project,
                    program = %program.program,
                    count = plugins.len(),
                    "resolved required plugins"
                );
                Ok(Response::new(GetRequiredPluginsResponse { plugins }))
            }
            Err(e) => {
                warn!(
                    project = %program.project,
                    program = %program.program,
                    error = %e,
                    "failed to resolve required plugins"
                );
                Err(e.into())
            }
        }
    }

    async fn run(&self, request: Request<RunRequest>) -> Result<Response<RunResponse>, Status> {
        let info = RunInfo::from(request.into_inner());
        let span = info_span!(
            "run",
            project = %info.project,
            stack = %info.stack,
            program = %info.program,
            dry_run = info.dry_run,
        );

        // Dropping this future (client cancel, deadline) cancels the run.
        let cancel = self.shutdown.child_token();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let host = self.host.clone();
        let handle =
            tokio::spawn(async move { host.run(info, cancel).await }.instrument(span.clone()));

        let error = match handle.await {
            Ok(Ok(())) => String::new(),
            Ok(Err(e)) => failure_message(&e),
            Err(e) => join_error_message(e),
        };

        span.in_scope(|| {
            if error.is_empty() {
                info!("run succeeded");
            } else {
                error!(error = %error, "run failed");
            }
        });
        Ok(Response::new(RunResponse { error }))
    }

    async fn get_plugin_info(&self, _request: Request<()>) -> Result<Response<PluginInfo>, Status> {
        Ok(Response::new(PluginInfo {
            version: self.host.version(),
        }))
    }
}
