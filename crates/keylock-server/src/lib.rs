// Keylock demo server: HTTP endpoints exercising reentrant distributed locks

pub mod api; // HTTP handlers and routes
pub mod model; // Configuration, shared state and response types
pub mod service; // Demo services built on the lock coordinator
pub mod startup; // Logging and HTTP server setup

pub use model::{AppState, Configuration};
