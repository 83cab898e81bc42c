use account_vending_core::contract::{CallbackResponse, LifecycleEvent, ResponseStatus};
use tracing::{error, info};

use crate::adapters::callback::CallbackSender;
use crate::error::ProviderError;

pub fn send_response(
    callback: &dyn CallbackSender,
    event: &LifecycleEvent,
    response: &CallbackResponse,
) -> Result<(), ProviderError> {
    let body = response.to_json();
    info!(
        component = "callback_notifier",
        event = "callback_sending",
        status = status_label(response.status),
        request_id = %event.request_id,
        body = %body
    );
    callback.put_response(&event.response_url, &body)
}

/// Sends the response and reports whether CloudFormation accepted it.
/// Failures are logged, never propagated.
pub fn deliver_response(
    callback: &dyn CallbackSender,
    event: &LifecycleEvent,
    response: &CallbackResponse,
) -> bool {
    match send_response(callback, event, response) {
        Ok(()) => true,
        Err(send_error) => {
            error!(
                component = "callback_notifier",
                event = "callback_failed",
                request_id = %event.request_id,
                error = %send_error
            );
            false
        }
    }
}

fn status_label(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Success => "SUCCESS",
        ResponseStatus::Failed => "FAILED",
    }
}
