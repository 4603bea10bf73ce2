use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{connection, framing::DEFAULT_MAX_REQUEST_BYTES, store::MetricStore};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on bytes buffered for one request before it is rejected.
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    store: Arc<MetricStore>,
    config: ServerConfig,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_config(listener, ServerConfig::default())
    }

    pub fn with_config(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            store: Arc::new(MetricStore::new()),
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the store every connection writes into.
    pub fn store(&self) -> Arc<MetricStore> {
        Arc::clone(&self.store)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            store,
            config,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!(metrics = store.metric_count(), "metrics server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &store, &config);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    store: &Arc<MetricStore>,
    config: &ServerConfig,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, store, config),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(
    stream: TcpStream,
    peer: SocketAddr,
    store: &Arc<MetricStore>,
    config: &ServerConfig,
) {
    let store = Arc::clone(store);
    let max_request_bytes = config.max_request_bytes;
    debug!(peer = %peer, "connection opened");

    tokio::spawn(async move {
        match connection::serve(stream, store, max_request_bytes).await {
            Ok(()) => debug!(peer = %peer, "connection closed"),
            Err(err) => warn!(peer = %peer, error = ?err, "connection closed with error"),
        }
    });
}
