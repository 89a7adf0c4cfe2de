//! Data models module
//!
//! - `config` - Configuration management
//! - `response` - HTTP response wrapper
//! - `app_state` - Application state shared across handlers

pub mod app_state;
pub mod config;
pub mod response;

pub use app_state::AppState;
pub use config::{Cli, Configuration, DemoConfig};
pub use response::Result;
