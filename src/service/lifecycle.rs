//! Server lifecycle: hot rebuild of the route table and listener swap.
//!
//! A single task owns the settings snapshot and the running server. Rebuild
//! and stop requests reach it over a bounded channel and are processed
//! strictly one at a time, so at most one listener exists at any moment.
//!
//! # Rebuild
//! ```text
//! shut down current server (no deadline) → resolve listen address
//!     → fetch registry listing → build handlers → bind → serve on a new task
//! ```
//!
//! Status transitions are published on a `watch` channel:
//! `Stopped → Starting → Listening(addr) → Stopping → Stopped`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::api::build_router;
use crate::api::proxy::ReverseProxy;
use crate::app_state::{AppState, DataLogging, GatewayContext};
use crate::config::ValidatedSettings;
use crate::error::GatewayError;
use crate::routing::{Dispatcher, RouteSignature, RouteTableBuilder};

/// Listener state as seen from outside the lifecycle task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// No listener.
    Stopped,
    /// A rebuild is binding a new listener.
    Starting,
    /// Serving on the given address.
    Listening(SocketAddr),
    /// The current listener is draining.
    Stopping,
}

impl ServerStatus {
    /// Returns the listening address, if any.
    #[must_use]
    pub const fn addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Listening(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Listening(addr) => write!(f, "listening on {addr}"),
            Self::Stopping => f.write_str("stopping"),
        }
    }
}

/// Outcome of one completed rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    /// Address the new server listens on.
    pub addr: SocketAddr,
    /// Number of reachable action bindings.
    pub bound_handlers: usize,
    /// Reachable bindings, in dispatch order.
    pub routes: Vec<RouteSignature>,
    /// When the new server started listening.
    pub started_at: DateTime<Utc>,
}

type RebuildReply = oneshot::Sender<Result<RebuildReport, GatewayError>>;

#[derive(Debug)]
enum Command {
    Rebuild {
        trigger: &'static str,
        reply: Option<RebuildReply>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running lifecycle task.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ServerStatus>,
}

impl LifecycleHandle {
    /// Queues a rebuild without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LifecycleClosed`] if the lifecycle has
    /// stopped.
    pub async fn rebuild(&self, trigger: &'static str) -> Result<(), GatewayError> {
        self.commands
            .send(Command::Rebuild {
                trigger,
                reply: None,
            })
            .await
            .map_err(|_| GatewayError::LifecycleClosed)
    }

    /// Queues a rebuild and waits until its server is listening.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Bind`] if the listener cannot be bound, or
    /// [`GatewayError::LifecycleClosed`] if the lifecycle has stopped.
    pub async fn rebuild_and_wait(&self, trigger: &'static str) -> Result<RebuildReport, GatewayError> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Command::Rebuild {
                trigger,
                reply: Some(reply),
            })
            .await
            .map_err(|_| GatewayError::LifecycleClosed)?;
        receiver.await.map_err(|_| GatewayError::LifecycleClosed)?
    }

    /// Shuts the current server down and ends the lifecycle task.
    ///
    /// Rebuilds queued before the stop still run first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LifecycleClosed`] if the lifecycle had
    /// already stopped.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .await
            .map_err(|_| GatewayError::LifecycleClosed)?;
        receiver.await.map_err(|_| GatewayError::LifecycleClosed)
    }

    /// Returns a receiver for status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ServerStatus> {
        self.status.clone()
    }

    /// Returns the latest status.
    #[must_use]
    pub fn current_status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    /// Returns `true` once the lifecycle task has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owner of the settings snapshot and the running server.
pub struct ServerLifecycle {
    settings: ValidatedSettings,
    context: GatewayContext,
    builder: RouteTableBuilder,
    current: Option<RunningServer>,
    status: Arc<watch::Sender<ServerStatus>>,
}

impl fmt::Debug for ServerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerLifecycle")
            .field("listen", &self.settings.listen_address())
            .field("current", &self.current.as_ref().map(|s| s.addr))
            .finish_non_exhaustive()
    }
}

impl ServerLifecycle {
    /// Spawns the lifecycle task and returns its handle.
    ///
    /// Nothing listens until the first rebuild is requested.
    #[must_use]
    pub fn spawn(settings: ValidatedSettings, context: GatewayContext, capacity: usize) -> LifecycleHandle {
        let (commands, receiver) = mpsc::channel(capacity.max(1));
        let (status, status_rx) = watch::channel(ServerStatus::Stopped);
        let lifecycle = Self {
            builder: RouteTableBuilder::new(Arc::clone(&settings.routes)),
            settings,
            context,
            current: None,
            status: Arc::new(status),
        };
        tokio::spawn(lifecycle.run(receiver));
        LifecycleHandle {
            commands,
            status: status_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Rebuild { trigger, reply } => {
                    tracing::info!(trigger, "rebuilding gateway");
                    let result = self.rebuild().await;
                    if let Err(e) = &result {
                        tracing::error!(trigger, error = %e, "rebuild failed");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Stop { reply } => {
                    self.shutdown_current().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        self.shutdown_current().await;
        tracing::debug!("lifecycle task finished");
    }

    async fn rebuild(&mut self) -> Result<RebuildReport, GatewayError> {
        self.shutdown_current().await;

        let addr = self.settings.listen_address();
        self.status.send_replace(ServerStatus::Starting);
        tracing::info!(addr = %addr, "server starting");

        let (router, bound_handlers, routes) = self.build().await;

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.status.send_replace(ServerStatus::Stopped);
                return Err(GatewayError::Bind { addr, source });
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                self.status.send_replace(ServerStatus::Stopped);
                return Err(GatewayError::Bind { addr, source });
            }
        };

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
            if let Err(e) = served {
                tracing::error!(addr = %local, error = %e, "server stopped with error");
                // Only a server that died on its own is still marked listening.
                status.send_if_modified(|current| {
                    let died = *current == ServerStatus::Listening(local);
                    if died {
                        *current = ServerStatus::Stopped;
                    }
                    died
                });
            }
        });

        self.current = Some(RunningServer {
            addr: local,
            shutdown,
            task,
        });
        self.status.send_replace(ServerStatus::Listening(local));
        tracing::info!(addr = %local, bound = bound_handlers, "server listening");

        Ok(RebuildReport {
            addr: local,
            bound_handlers,
            routes,
            started_at: Utc::now(),
        })
    }

    async fn build(&self) -> (axum::Router, usize, Vec<RouteSignature>) {
        let handlers = self
            .builder
            .fetch_and_build(self.context.registry.as_ref())
            .await;
        let logging = DataLogging {
            request_params: self.settings.log_request_params,
            response_data: self.settings.log_response_data,
        };

        let state = match &self.settings.reverse_proxy {
            Some(proxy) => {
                let dispatcher = Dispatcher::new(handlers, &proxy.gateway_path);
                tracing::info!(
                    gateway_path = %proxy.gateway_path,
                    target = %proxy.target,
                    target_path = %proxy.target_path,
                    "reverse proxy enabled"
                );
                AppState::new(&self.context, dispatcher, logging)
                    .with_proxy(ReverseProxy::new(proxy.clone()))
            }
            None => AppState::new(&self.context, Dispatcher::new(handlers, "/"), logging),
        };
        let bound = state.dispatcher.len();
        let routes = state.dispatcher.signatures();
        (build_router(state, self.settings.cors), bound, routes)
    }

    async fn shutdown_current(&mut self) {
        let Some(server) = self.current.take() else {
            return;
        };
        self.status.send_replace(ServerStatus::Stopping);
        tracing::info!(addr = %server.addr, "server stopping");
        if server.shutdown.send(()).is_err() {
            tracing::debug!(addr = %server.addr, "server already closed");
        }
        if let Err(e) = server.task.await {
            tracing::error!(addr = %server.addr, error = %e, "server task failed");
        }
        self.status.send_replace(ServerStatus::Stopped);
        tracing::info!(addr = %server.addr, "server stopped");
    }
}
