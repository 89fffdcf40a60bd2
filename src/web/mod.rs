//! HTTP surface for the trial explorer
//!
//! The web module assembles the public HTTP surface:
//!
//! - [`api`] - REST handlers under `/api/v1`
//! - [`assets`] - static asset resolution and the SPA fallback
//! - [`server`] - router assembly, CORS, tracing, graceful shutdown

pub mod api;
pub mod assets;
pub mod server;

pub use api::{ApiResponse, ErrorResponse};
pub use assets::{AssetResolver, RouteDecision};
pub use server::{AppServer, AppState, ServerError};
