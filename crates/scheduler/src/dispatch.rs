//! Reference `DispatchPort` implementation for running the scheduler
//! without a real chat transport wired in (demos, integration tests). The
//! actual transport is an external collaborator outside this workspace
//! (§4.12, §5).

use async_trait::async_trait;

use accord_domain::{DispatchPort, DomainError, Payload};

/// Logs every delivery at `info` instead of sending it anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatchPort;

#[async_trait]
impl DispatchPort for LoggingDispatchPort {
    async fn deliver(&self, recipient_id: &str, payload: Payload) -> Result<(), DomainError> {
        match payload {
            Payload::Text { body, inline_actions } => {
                tracing::info!(recipient = %recipient_id, actions = inline_actions.len(), "{body}");
            }
            Payload::Voice { body, inline_actions, .. } => {
                tracing::info!(recipient = %recipient_id, actions = inline_actions.len(), voice = true, "{body}");
            }
            Payload::Photo { body, inline_actions, .. } => {
                tracing::info!(recipient = %recipient_id, actions = inline_actions.len(), photo = true, "{body}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_always_succeeds() {
        let port = LoggingDispatchPort;
        let result = port
            .deliver(
                "user-1",
                Payload::Text {
                    body: "hello".to_string(),
                    inline_actions: Vec::new(),
                },
            )
            .await;
        assert!(result.is_ok());
    }
}
