//! Application layer for sats-arena: configuration, logging, component
//! wiring and the HTTP surface.

pub mod app;
pub mod config;
pub mod http;
pub mod logging;

pub use app::App;
pub use config::{AppConfig, Environment};
pub use logging::{LogConfig, LogFormat};
