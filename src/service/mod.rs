//! Service layer: server lifecycle and gateway orchestration.
//!
//! [`ServerLifecycle`] owns the listener and rebuilds it on request.
//! [`GatewayService`] starts the lifecycle and turns registry events from
//! the [`super::domain::EventBus`] into rebuild requests.

pub mod gateway;
pub mod lifecycle;

pub use gateway::GatewayService;
pub use lifecycle::{LifecycleHandle, RebuildReport, ServerLifecycle, ServerStatus};
