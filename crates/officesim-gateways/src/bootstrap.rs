use std::time::Duration;

use tracing::{info, warn};

use crate::chat::ChatGateway;
use crate::email::EmailGateway;

const MAX_ATTEMPTS: u32 = 10;
const INITIAL_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 5_000;

/// Ensure the simulation manager's mailbox and chat user exist, retrying
/// with exponential backoff while the backends come up. Failure after all
/// attempts is logged and non-fatal; sends will surface their own errors.
pub async fn bootstrap_channels(
    email: &dyn EmailGateway,
    chat: &dyn ChatGateway,
    manager_email: &str,
    manager_handle: &str,
) {
    let mut delay = INITIAL_DELAY_MS;
    for attempt in 1..=MAX_ATTEMPTS {
        match email
            .ensure_mailbox(manager_email, Some("Simulation Manager"))
            .await
        {
            Ok(()) => {
                info!(attempt, "email backend bootstrapped");
                break;
            }
            Err(e) if attempt == MAX_ATTEMPTS => {
                warn!(error = %e, "email backend unreachable after {MAX_ATTEMPTS} attempts; email features may not work");
            }
            Err(_) => {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 3 / 2).min(MAX_DELAY_MS);
            }
        }
    }

    let mut delay = INITIAL_DELAY_MS;
    for attempt in 1..=MAX_ATTEMPTS {
        match chat
            .ensure_user(manager_handle, Some("Simulation Manager"))
            .await
        {
            Ok(()) => {
                info!(attempt, "chat backend bootstrapped");
                break;
            }
            Err(e) if attempt == MAX_ATTEMPTS => {
                warn!(error = %e, "chat backend unreachable after {MAX_ATTEMPTS} attempts; chat features may not work");
            }
            Err(_) => {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 3 / 2).min(MAX_DELAY_MS);
            }
        }
    }
}
