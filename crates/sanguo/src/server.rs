//! `SanguoServer` builder and server loop.
//!
//! This is the entry point for running a Sanguo game server. It ties
//! together all the layers: transport → protocol → session → room.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use sanguo_engine::Catalog;
use sanguo_protocol::{Codec, JsonCodec};
use sanguo_room::{HistorySink, LogHistorySink, MatchmakingQueue, RoomRegistry, RoomServices};
use sanguo_session::{Authenticator, DevAuthenticator, SessionManager};
use sanguo_transport::{Transport, WebSocketTransport};

use crate::handler::{handle_connection, seat_match};
use crate::outbound::Outbound;
use crate::{SanguoError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) matchmaking: Arc<MatchmakingQueue>,
    pub(crate) outbound: Arc<Outbound>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Sanguo server.
///
/// # Example
///
/// ```rust,no_run
/// use sanguo::{SanguoServer, ServerConfig};
/// use sanguo_session::DevAuthenticator;
///
/// # async fn start() -> Result<(), sanguo::SanguoError> {
/// let server = SanguoServer::builder()
///     .config(ServerConfig::from_env()?)
///     .build(DevAuthenticator)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct SanguoServerBuilder {
    config: ServerConfig,
    catalog: Option<Arc<dyn Catalog>>,
    history: Option<Arc<dyn HistorySink>>,
}

impl SanguoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            catalog: None,
            history: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_owned();
        self
    }

    /// Uses `catalog` instead of the one named in the config.
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Where finished matches go. Defaults to [`LogHistorySink`].
    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Validates the config, binds the listener and wires the registry,
    /// matchmaking and connection table together.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<SanguoServer<A, JsonCodec>, SanguoError> {
        self.config.validate()?;
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(self.config.load_catalog()?),
        };
        let history = self.history.unwrap_or_else(|| Arc::new(LogHistorySink));

        let transport = WebSocketTransport::bind(&self.config.bind).await?;

        let outbound = Arc::new(Outbound::default());
        let services = RoomServices::new(outbound.clone(), history, catalog);
        let registry = Arc::new(RoomRegistry::new(self.config.rooms.clone(), services));
        let matchmaking = Arc::new(MatchmakingQueue::new(
            Arc::clone(&registry),
            self.config.matchmaking.clone(),
        ));

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new()),
            registry,
            matchmaking,
            outbound,
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(SanguoServer { transport, state })
    }
}

impl Default for SanguoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Sanguo game server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct SanguoServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl SanguoServer<DevAuthenticator, JsonCodec> {
    /// Creates a new builder. The authenticator is chosen at
    /// [`build`](SanguoServerBuilder::build).
    pub fn builder() -> SanguoServerBuilder {
        SanguoServerBuilder::new()
    }
}

impl<A, C> SanguoServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.state.registry
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), SanguoError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections and runs matchmaking until `shutdown`
    /// completes, then closes every connection and room.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), SanguoError>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let seating = Arc::clone(&self.state);
        let matchmaker = self.state.matchmaking.spawn(stop_rx.clone(), move |found| {
            let state = Arc::clone(&seating);
            async move { seat_match(&state, found).await }
        });
        info!(addr = ?self.local_addr().ok(), "Sanguo server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        let stop = stop_rx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state, stop).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
                () = &mut shutdown => break,
            }
        }

        info!("shutting down");
        stop_tx.send_replace(true);
        if let Err(e) = matchmaker.await {
            warn!(error = %e, "matchmaking task ended abnormally");
        }
        self.state.registry.shutdown().await;
        info!("Sanguo server stopped");
        Ok(())
    }
}
