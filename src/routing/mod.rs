//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registry listing (services → actions)
//!     → whitelist.rs (per-route inclusion)
//!     → alias.rs (Restrict drop, URL path, accepted methods)
//!     → table.rs (ordered BoundHandler list)
//!     → dispatcher.rs (first-match URL dispatch)
//! ```
//!
//! # Design Decisions
//! - Route tables are rebuilt from scratch, never patched in place
//! - Configuration errors (malformed aliases) surface when routes are
//!   validated, before any table is built
//! - Invalid whitelist regexes are skipped with a warning

pub mod alias;
pub mod dispatcher;
pub mod pattern;
pub mod table;
pub mod whitelist;

pub use alias::{AliasSpec, AliasTable, HttpMethod, MethodSet, normalize_path};
pub use dispatcher::Dispatcher;
pub use pattern::{PathParams, PathPattern};
pub use table::{BoundHandler, Route, RouteSignature, RouteTableBuilder};
pub use whitelist::Whitelist;
