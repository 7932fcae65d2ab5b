pub mod config;
pub mod error;
pub mod router;
pub mod rpc;
pub mod server;
pub mod session;
pub mod stream;

pub use config::{load_config, ServerConfig};
pub use server::{start, ServerHandle};
