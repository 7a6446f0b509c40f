use std::{io::Write, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use proto_api::{
    descriptor::LANGUAGE_FILE_DESCRIPTOR_SET,
    language_pb::language_runtime_server::LanguageRuntimeServer,
};
use tokio::{net::TcpListener, signal};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, info_span, Instrument};

use crate::{
    config::LanghostConfig,
    host::LanguageHost,
    language_runtime::LanguageRuntimeService,
    runner::ProcessHost,
};

pub struct Service {
    pub config: Arc<LanghostConfig>,
    pub shutdown: CancellationToken,
}

impl Service {
    pub fn new(config: LanghostConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Binds, announces the port on stdout and serves until SIGINT/SIGTERM.
    pub async fn start(&self) -> Result<()> {
        let span = info_span!("service", env = %self.config.env);

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let local_addr = listener.local_addr()?;
        announce_port(local_addr.port())?;

        let shutdown = self.shutdown.clone();
        tokio::spawn(
            async move {
                shutdown_signal(shutdown).await;
            }
            .instrument(span.clone()),
        );

        let host = ProcessHost::new(self.config.runtime.clone());
        serve(listener, host, self.shutdown.clone())
            .instrument(span)
            .await
    }
}

/// The orchestrator that launched us reads the port from the first line of
/// stdout.
fn announce_port(port: u16) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{port}").context("failed to announce port")?;
    stdout.flush().context("failed to announce port")?;
    Ok(())
}

/// Serves `host` as the `LanguageRuntime` service, plus reflection, on
/// `listener` until `shutdown` fires. In-flight runs are cancelled on
/// shutdown.
pub async fn serve<H: LanguageHost>(
    listener: TcpListener,
    host: H,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(LANGUAGE_FILE_DESCRIPTOR_SET)
        .build_v1()?;

    info!(addr = %addr, "language host grpc listening");

    let runtime = LanguageRuntimeService::new(host, shutdown.clone());
    Server::builder()
        .add_service(LanguageRuntimeServer::new(runtime))
        .add_service(reflection_service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.cancelled().await;
            info!("language host grpc shutting down");
        })
        .await
        .context("gRPC server error")?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => return,
    }
    info!("signal received, shutting down language host gracefully");
    shutdown.cancel();
}
