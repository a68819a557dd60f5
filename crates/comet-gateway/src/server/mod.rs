//! Gateway server setup
//!
//! Binds the client listeners and the push RPC server around one shared
//! [`Gateway`].

mod gateway;
mod handler;
mod listener;

pub use gateway::Gateway;
pub use handler::{serve_connection, PeerInfo};
pub use listener::{bind_tcp, serve_tcp, serve_websocket};

use crate::authority::Authority;
use crate::rpc;
use comet_common::{AppConfig, AppError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running gateway with its bound addresses
pub struct CometServer {
    gateway: Arc<Gateway>,
    tcp_addrs: Vec<SocketAddr>,
    ws_addrs: Vec<SocketAddr>,
    rpc_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl CometServer {
    /// Bind every listener and start serving
    pub async fn start(config: AppConfig, authority: Arc<dyn Authority>) -> Result<Self, AppError> {
        let gateway = Gateway::new(config, authority);
        let config = gateway.config().clone();
        let mut tasks = vec![gateway.spawn_online_loop()];

        let mut tcp_addrs = Vec::with_capacity(config.tcp.bind.len());
        for addr in &config.tcp.bind {
            let listener = bind_tcp(addr, &config.tcp)?;
            let local = listener.local_addr()?;
            tracing::info!(addr = %local, "tcp listening");
            tcp_addrs.push(local);
            tasks.extend(serve_tcp(Arc::clone(&gateway), listener, config.tcp.accept));
        }

        let mut ws_addrs = Vec::with_capacity(config.websocket.bind.len());
        for addr in &config.websocket.bind {
            let listener = bind_tcp(addr, &config.tcp)?;
            let local = listener.local_addr()?;
            tracing::info!(addr = %local, "websocket listening");
            ws_addrs.push(local);
            tasks.extend(serve_websocket(Arc::clone(&gateway), listener, config.tcp.accept));
        }

        let listener = TcpListener::bind(config.rpc.bind.as_str())
            .await
            .map_err(|e| AppError::bind(&config.rpc.bind, e))?;
        let rpc_addr = listener.local_addr()?;
        tracing::info!(addr = %rpc_addr, "push rpc listening");

        let app = rpc::create_app(Arc::clone(&gateway));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "push rpc server stopped");
            }
        }));

        Ok(Self {
            gateway,
            tcp_addrs,
            ws_addrs,
            rpc_addr,
            tasks,
        })
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn tcp_addrs(&self) -> &[SocketAddr] {
        &self.tcp_addrs
    }

    pub fn ws_addrs(&self) -> &[SocketAddr] {
        &self.ws_addrs
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Stop accepting and stop the push server
    ///
    /// Connections already being served run until their peers leave or their
    /// deadlines fire.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!(server_id = %self.gateway.server_id(), "gateway stopped");
    }
}

impl Drop for CometServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Run the gateway until Ctrl-C
pub async fn run(config: AppConfig, authority: Arc<dyn Authority>) -> Result<(), AppError> {
    let mut server = CometServer::start(config, authority).await?;
    tracing::info!(server_id = %server.gateway().server_id(), "gateway started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    server.shutdown();
    Ok(())
}
