use super::{Notification, NotificationSink, NotifyError};
use crate::config::WorkerServiceConfig;
use crate::registry::Collection;
use crate::shared::ids::SessionId;
use serde::Serialize;

pub const STEP_FINISHED_PATH: &str = "/api/steps/finished";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepFinishedBody<'a> {
    session_id: &'a SessionId,
    collection: &'a Collection,
}

/// Hands finished steps to the downstream worker service over HTTP.
pub struct WorkerServiceClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl WorkerServiceClient {
    pub fn new(config: &WorkerServiceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout())
            .timeout(config.timeout())
            .build();
        Self {
            endpoint: format!("{}{}", config.url.trim_end_matches('/'), STEP_FINISHED_PATH),
            agent,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl NotificationSink for WorkerServiceClient {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Notification::StepFinished {
            session_id,
            collection,
        } = notification
        else {
            return Ok(());
        };
        let body = serde_json::to_value(StepFinishedBody {
            session_id,
            collection,
        })
        .map_err(|source| NotifyError::Encode {
            method: notification.method(),
            source,
        })?;
        self.agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(|err| NotifyError::WorkerService {
                endpoint: self.endpoint.clone(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_built_from_base_url_and_other_methods_are_ignored() {
        let client = WorkerServiceClient::new(&WorkerServiceConfig {
            url: "http://127.0.0.1:9/".to_string(),
            timeout_ms: 200,
        });
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/api/steps/finished");
        client
            .publish(&Notification::CollectionsStatus(Vec::new()))
            .expect("viewer-only notifications never hit the network");
    }
}
