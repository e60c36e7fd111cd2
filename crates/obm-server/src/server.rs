use obm_merger::QueryService;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Query server in front of a running merger.
pub struct ObmServer {
    config: ServerConfig,
    query: QueryService,
}

impl ObmServer {
    pub fn new(config: ServerConfig, query: QueryService) -> Self {
        Self { config, query }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.query.clone())
    }

    /// Serve until the process ends.
    pub async fn serve(self) -> ServerResult<()> {
        let (_tx, rx) = watch::channel(false);
        self.serve_until(rx).await
    }

    /// Serve until `shutdown` flips to `true` or its sender drops.
    pub async fn serve_until(self, mut shutdown: watch::Receiver<bool>) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("obm query server listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
