//! HTTP endpoints of the demo server

pub mod distribute_lock;
pub mod guarded;
pub mod route;

pub use route::{distribute_lock_routes, test_routes};
