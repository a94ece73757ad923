//! Local HTTP shell server. Every request it receives is answered through
//! the asset cache policy.

pub mod config;
mod http_layers;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
