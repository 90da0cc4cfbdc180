//! HTTP server implementation using Axum.
//!
//! One server serves one proxy on one URL path. Its lifecycle is
//! `Unbound -> Serving -> ShuttingDown -> Stopped`; only the shutdown token
//! moves it out of `Serving`. Each transition is logged.

use crate::handler::handle_rpc;
use axum::{routing::post, Router};
use procgate_core::{ExitHookStatus, RpcEndpoint, RpcProxy, ShutdownReason, ShutdownToken};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Unbound,
    Serving,
    ShuttingDown,
    Stopped,
}

/// How a serve loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOutcome {
    pub reason: ShutdownReason,
    /// Whether a remote caller signalled termination before shutdown.
    pub termination_requested: bool,
    pub exit_hook: ExitHookStatus,
}

impl ServeOutcome {
    /// Process exit status for the host: interrupts keep the conventional 130.
    pub fn exit_code(&self) -> u8 {
        match self.reason {
            ShutdownReason::Interrupt => 130,
            ShutdownReason::ExitRequested => 0,
        }
    }
}

/// A bound JSON-RPC endpoint in front of one proxy.
pub struct RpcServer<T> {
    listener: TcpListener,
    endpoint: RpcEndpoint,
    proxy: Arc<RpcProxy<T>>,
}

impl<T: Send + Sync + 'static> RpcServer<T> {
    /// Bind the listener. The endpoint's port may be 0 to auto-assign.
    pub async fn bind(endpoint: &RpcEndpoint, proxy: Arc<RpcProxy<T>>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(endpoint.bind_addr()).await?;
        let actual_addr = listener.local_addr()?;

        let endpoint = RpcEndpoint::new(
            actual_addr.ip().to_string(),
            actual_addr.port(),
            &endpoint.path,
        );
        info!("Starting RPC server on {} ..", endpoint);

        Ok(Self {
            listener,
            endpoint,
            proxy,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The endpoint actually bound, with the resolved port.
    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&self.endpoint.path, post(handle_rpc::<T>))
            .layer(TraceLayer::new_for_http())
            // One call at a time, start to finish.
            .layer(ConcurrencyLimitLayer::new(1))
            .with_state(self.proxy.clone())
    }

    /// Serve until `shutdown` fires, then run the proxy's exit hook once.
    ///
    /// The hook runs on the blocking pool; it may wait on child processes.
    pub async fn run(self, shutdown: ShutdownToken) -> anyhow::Result<ServeOutcome> {
        let app = self.router();
        let Self { listener, proxy, .. } = self;
        let state = transition(ServerState::Unbound, ServerState::Serving);
        let signal = shutdown.clone();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let reason = signal.triggered().await;
                info!("RPC server loop interrupted ({}): clean up and propagate", reason);
            })
            .await;

        let state = transition(state, ServerState::ShuttingDown);
        let hook_proxy = proxy.clone();
        let exit_hook = tokio::task::spawn_blocking(move || hook_proxy.run_exit_hook())
            .await
            .unwrap_or_else(|e| {
                error!("Exit hook task failed: {}", e);
                ExitHookStatus::Failed
            });
        if exit_hook == ExitHookStatus::Failed {
            warn!("Exit hook failed; continuing shutdown");
        }
        transition(state, ServerState::Stopped);

        served?;

        Ok(ServeOutcome {
            reason: shutdown.reason().unwrap_or(ShutdownReason::ExitRequested),
            termination_requested: proxy.termination_requested(),
            exit_hook,
        })
    }
}

fn transition(from: ServerState, to: ServerState) -> ServerState {
    info!("RPC server state {:?} -> {:?}", from, to);
    to
}

/// Bind and serve in one step.
pub async fn serve<T: Send + Sync + 'static>(
    endpoint: &RpcEndpoint,
    proxy: Arc<RpcProxy<T>>,
    shutdown: ShutdownToken,
) -> anyhow::Result<ServeOutcome> {
    RpcServer::bind(endpoint, proxy).await?.run(shutdown).await
}

/// Trigger `token` on Ctrl-C (interrupt) or SIGTERM (exit request).
pub fn listen_for_signals(token: ShutdownToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let reason = wait_for_signal().await;
        info!("Shutdown signal received: {}", reason);
        token.trigger(reason);
    })
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = interrupt() => ShutdownReason::Interrupt,
            _ = terminate.recv() => ShutdownReason::ExitRequested,
        },
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            interrupt().await;
            ShutdownReason::Interrupt
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownReason {
    interrupt().await;
    ShutdownReason::Interrupt
}
