use tracing::info;

use send_message_module::{send_message, DeliveryTable, SendMessageParams};

use super::types::SchedulerError;

/// Outbound seam the scheduler fires tasks through.
pub trait DispatchAdapter {
    fn send(&self, target: &str, content: &str) -> Result<(), SchedulerError>;
}

/// Production adapter: delivers task content over the webhook transport.
#[derive(Debug, Clone, Default)]
pub struct WebhookDispatcher {
    routes: DeliveryTable,
}

impl WebhookDispatcher {
    pub fn new(routes: DeliveryTable) -> Self {
        Self { routes }
    }
}

impl DispatchAdapter for WebhookDispatcher {
    fn send(&self, target: &str, content: &str) -> Result<(), SchedulerError> {
        let params = SendMessageParams {
            target: target.to_string(),
            text: content.to_string(),
        };
        send_message(&self.routes, &params)
            .map_err(|err| SchedulerError::Dispatch(err.to_string()))?;
        info!("delivered scheduled message to {}", target);
        Ok(())
    }
}
