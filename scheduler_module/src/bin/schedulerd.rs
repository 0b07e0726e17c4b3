use std::sync::Arc;

use tracing::{error, info};

use scheduler_module::{start_scheduler_thread, Scheduler, SchedulerConfig, WebhookDispatcher};
use send_message_module::DeliveryTable;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid scheduler configuration: {}", err);
            std::process::exit(1);
        }
    };

    let routes = match DeliveryTable::from_env(config.routes_path.as_deref()) {
        Ok(routes) => routes,
        Err(err) => {
            error!("failed to load delivery routes: {}", err);
            std::process::exit(1);
        }
    };

    let scheduler = Arc::new(Scheduler::load(
        &config.state_path,
        config.wall_offset,
        WebhookDispatcher::new(routes),
    ));
    info!(
        "scheduler loaded {} task(s) from {}",
        scheduler.task_count(),
        config.state_path.display()
    );

    let control = start_scheduler_thread(Arc::clone(&scheduler), config.tick_period);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    control.stop_and_join();
    if let Err(err) = scheduler.flush() {
        error!("failed to flush task table on shutdown: {}", err);
    }

    Ok(())
}
