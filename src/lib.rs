pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod server;
pub mod types;

pub use error::GatewayError;
pub type Result<T> = std::result::Result<T, GatewayError>;
