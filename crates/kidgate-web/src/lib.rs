//! HTTP JSON surface for the kidgate moderation pipeline.
//!
//! `kidgate-web` exposes the whitelist builder, the three model-judged stages
//! and the whole [`Gatekeeper`](kidgate::gate::Gatekeeper) pipeline as REST
//! endpoints for a parent-facing front end.
//!
//! # Quick start
//!
//! ```ignore
//! use kidgate::config::GateConfig;
//! use kidgate_web::{AppState, WebConfig, spawn_web};
//!
//! let state = AppState::from_config(GateConfig::default(), None)?;
//! let addr = spawn_web(state, WebConfig::default()).await?;
//! println!("API: http://{addr}/api");
//! ```
//!
//! # Routes
//!
//! | Method | Path | Body / query | Returns |
//! |--------|------|--------------|---------|
//! | GET | `/api/features` | `?age=N` | feature catalog |
//! | GET | `/api/strategies` | | strategy catalog |
//! | POST | `/api/prompt` | `{features}` | `{system_prompt}` |
//! | POST | `/api/screen` | `{child_prompt, features \| system_prompt}` | compliance verdict |
//! | POST | `/api/compose` | compose request | moderation result |
//! | POST | `/api/validate` | validation request | validation verdict |
//! | POST | `/api/followup` | `{initial_prompt, initial_response}` | `{child_followup_prompt}` |
//! | POST | `/api/interact` | interaction (+ `features`) | gate outcome |
//! | PUT | `/api/children/{child_id}/whitelist` | `{features, targets}` | sync report |
//! | GET | `/api/audit/{user_id}` | `?limit=N` | recent checks |
//!
//! Errors come back as `{"error": ..., "kind": ...}` with
//! 400 for unknown strategies, 502 for upstream failures and 500 otherwise.

mod api;
mod server;

pub use api::AppState;
pub use server::build_router;

use std::net::SocketAddr;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Bind the listener and serve on a Tokio task.
///
/// Returns the bound address (useful with port 0). The server runs until the
/// Tokio runtime shuts down.
pub async fn spawn_web(state: AppState, config: WebConfig) -> std::io::Result<SocketAddr> {
    server::start_server(build_router(state), config.bind_addr).await
}
