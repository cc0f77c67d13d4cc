//! # action-gateway
//!
//! Dynamic HTTP gateway for RPC actions.
//!
//! Actions (`service.action`) published by a live service registry are
//! exposed over HTTP. Per-route whitelist and alias rules decide which
//! actions are reachable and under which URL and methods. The route table
//! is rebuilt, and the listener swapped, every time a service appears or
//! disappears.
//!
//! ## Architecture
//!
//! ```text
//! Registry events (domain/)
//!     │
//!     ├── GatewayService (service/)
//!     ├── ServerLifecycle (service/)      one rebuild at a time
//!     │
//!     ├── RouteTableBuilder (routing/)    whitelist → alias → bound handlers
//!     ├── Dispatcher (routing/)
//!     │
//!     ├── Action handler (api/)           params → Call → codec
//!     └── Reverse proxy (api/)            optional upstream forwarding
//! ```

pub mod api;
pub mod app_state;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod routing;
pub mod service;
