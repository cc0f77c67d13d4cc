//! Gateway service: validated settings in, running hot-reloading server out.
//!
//! Starting the service spawns the lifecycle, runs the first rebuild and
//! then listens for registry changes. Every `service.added` or
//! `service.removed` notification queues one rebuild.

use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::lifecycle::{LifecycleHandle, RebuildReport, ServerLifecycle, ServerStatus};
use crate::app_state::GatewayContext;
use crate::config::GatewaySettings;
use crate::domain::RegistryEvent;
use crate::error::GatewayError;

/// Trigger label used when the event stream lagged.
const LAGGED_TRIGGER: &str = "registry.lagged";

/// A running gateway.
#[derive(Debug)]
pub struct GatewayService {
    lifecycle: LifecycleHandle,
    startup: RebuildReport,
    watcher: JoinHandle<()>,
}

impl GatewayService {
    /// Validates `settings`, starts the first server and begins watching the
    /// registry.
    ///
    /// `capacity` bounds the rebuild request queue.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are invalid, or
    /// [`GatewayError::Bind`] if the first server cannot listen.
    pub async fn start(
        settings: &GatewaySettings,
        context: GatewayContext,
        capacity: usize,
    ) -> Result<Self, GatewayError> {
        let settings = settings.validate()?;
        // Subscribe first so no change between the first listing and the
        // watcher start is missed.
        let events = context.registry.subscribe();
        let lifecycle = ServerLifecycle::spawn(settings, context, capacity);

        let startup = match lifecycle.rebuild_and_wait("gateway.start").await {
            Ok(report) => report,
            Err(e) => {
                let _ = lifecycle.stop().await;
                return Err(e);
            }
        };
        tracing::info!(
            addr = %startup.addr,
            bound = startup.bound_handlers,
            "gateway started"
        );

        let watcher = tokio::spawn(watch_registry(events, lifecycle.clone()));
        Ok(Self {
            lifecycle,
            startup,
            watcher,
        })
    }

    /// Returns the lifecycle handle, e.g. to force a rebuild.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleHandle {
        &self.lifecycle
    }

    /// Returns the report of the startup rebuild.
    #[must_use]
    pub fn startup_report(&self) -> &RebuildReport {
        &self.startup
    }

    /// Returns the latest server status.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        self.lifecycle.current_status()
    }

    /// Stops watching the registry and shuts the server down.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LifecycleClosed`] if the lifecycle had
    /// already stopped.
    pub async fn stop(self) -> Result<(), GatewayError> {
        self.watcher.abort();
        let result = self.lifecycle.stop().await;
        tracing::info!("gateway stopped");
        result
    }
}

async fn watch_registry(mut events: Receiver<RegistryEvent>, lifecycle: LifecycleHandle) {
    loop {
        let trigger = match events.recv().await {
            Ok(event) => {
                tracing::debug!(
                    event = event.event_type_str(),
                    service = event.service(),
                    "registry changed"
                );
                event.event_type_str()
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "registry events lagged; rebuilding once");
                LAGGED_TRIGGER
            }
            Err(RecvError::Closed) => {
                tracing::info!("registry event stream closed");
                break;
            }
        };
        if lifecycle.rebuild(trigger).await.is_err() {
            break;
        }
    }
}
