//! Orchestrator-side handle to a running language host.

use std::time::Duration;

use anyhow::{Context, Result};
use proto_api::language_pb::{
    language_runtime_client::LanguageRuntimeClient as RuntimeClient,
    GetRequiredPluginsRequest,
    PluginDependency,
    PluginInfo,
    RunRequest,
};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::program::{ProgramInfo, RunInfo};

/// Default timeout for establishing a gRPC connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to a gRPC server at the given address (e.g., "127.0.0.1:9600").
///
/// Prepends `http://` and applies the standard connect timeout.
pub async fn connect_channel(addr: &str) -> Result<Channel> {
    Endpoint::from_shared(format!("http://{addr}"))
        .context("Invalid endpoint")?
        .connect_timeout(CONNECT_TIMEOUT)
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {addr}"))
}

/// Transport failures come back as `Err` (the underlying `tonic::Status` can
/// be recovered with `downcast_ref`); a program that ran and failed is
/// reported as `Ok(Some(message))` by [`LanguageRuntimeClient::run`].
#[derive(Clone)]
pub struct LanguageRuntimeClient {
    address: String,
    client: RuntimeClient<Channel>, // tonic client is cheap to clone
}

impl LanguageRuntimeClient {
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let channel = connect_channel(&address).await?;
        Ok(Self {
            address,
            client: RuntimeClient::new(channel),
        })
    }

    pub async fn get_required_plugins(&self, program: &ProgramInfo) -> Result<Vec<PluginDependency>> {
        let mut client = self.client.clone();
        let resp = client
            .get_required_plugins(GetRequiredPluginsRequest::from(program.clone()))
            .await?;
        let plugins = resp.into_inner().plugins;
        debug!(
            address = %self.address,
            program = %program.program,
            count = plugins.len(),
            "received required plugins"
        );
        Ok(plugins)
    }

    /// `Ok(None)` when the program completed, `Ok(Some(error))` when it
    /// failed while running.
    pub async fn run(&self, info: RunInfo) -> Result<Option<String>> {
        let mut client = self.client.clone();
        let resp = client.run(RunRequest::from(info)).await?.into_inner();
        if resp.error.is_empty() {
            return Ok(None);
        }
        Ok(Some(resp.error))
    }

    /// Like [`run`](Self::run), giving up after `timeout`. The host sees the
    /// call go away and stops the program.
    pub async fn run_with_timeout(&self, info: RunInfo, timeout: Duration) -> Result<Option<String>> {
        tokio::time::timeout(timeout, self.run(info))
            .await
            .with_context(|| format!("run did not complete within {}s", timeout.as_secs()))?
    }

    pub async fn get_plugin_info(&self) -> Result<PluginInfo> {
        let mut client = self.client.clone();
        let resp = client.get_plugin_info(()).await?;
        Ok(resp.into_inner())
    }
}
