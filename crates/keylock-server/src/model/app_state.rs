//! Application state shared across all handlers

use std::sync::Arc;

use keylock_core::LockCoordinator;

use super::config::{Configuration, DemoConfig};
use crate::service::{ContentionDemo, ReentrantService};

pub struct AppState {
    pub configuration: Configuration,
    pub coordinator: Arc<LockCoordinator>,
    pub contention: ContentionDemo,
    pub reentrant_service: ReentrantService,
}

impl AppState {
    pub fn new(
        configuration: Configuration,
        coordinator: Arc<LockCoordinator>,
        demo: DemoConfig,
    ) -> Self {
        Self {
            configuration,
            contention: ContentionDemo::new(coordinator.clone(), demo.clone()),
            reentrant_service: ReentrantService::new(coordinator.clone(), demo),
            coordinator,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("configuration", &self.configuration)
            .field("coordinator", &self.coordinator.stats())
            .finish()
    }
}
