mod client;
mod config;
mod error;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
