//! Demo services built on the lock coordinator

pub mod contention;
pub mod reentrant;

pub use contention::{ContentionDemo, ContentionReport};
pub use reentrant::{ReentrantReport, ReentrantService};
