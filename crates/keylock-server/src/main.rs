//! Main entry point for the Keylock demo server.

use std::sync::Arc;

use keylock_core::LockCoordinator;
use keylock_server::{model, startup};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = model::Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    keylock_core::metrics::describe_metrics();

    let lock_config = configuration.lock_config()?;
    let coordinator = Arc::new(LockCoordinator::from_config(&lock_config).await?);
    info!(
        namespace = %lock_config.namespace,
        store = %lock_config.store,
        default_ttl_ms = lock_config.default_ttl_ms,
        default_max_retries = lock_config.default_max_retries,
        "Lock coordinator ready"
    );

    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let demo_config = configuration.demo_config()?;
    let app_state = Arc::new(model::AppState::new(
        configuration,
        coordinator,
        demo_config,
    ));

    info!("Starting HTTP server on {}:{}", server_address, server_port);
    startup::main_server(app_state, server_address, server_port)?.await?;

    Ok(())
}
