use std::time::Duration;

use thiserror::Error;

use crate::models::message::RegistrationMessage;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("coordinator rejected registration: status={status}, body={body}")]
    Rejected { status: u16, body: String },
}

/// Posts a task's registration to the coordinator.
#[derive(Clone)]
pub struct RegistrationClient {
    client: reqwest::Client,
    url: String,
}

impl RegistrationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("approval-gate/1.0")
                .build()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the registration. Any transport failure or non-2xx answer is an error.
    pub async fn register(&self, msg: &RegistrationMessage) -> Result<(), RegistrationError> {
        let resp = self
            .client
            .post(&self.url)
            .json(msg)
            .send()
            .await
            .map_err(|e| RegistrationError::Transport {
                url: self.url.clone(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            namespace = %msg.namespace,
            task = %msg.task_name,
            "registered approval with coordinator"
        );
        Ok(())
    }
}
