use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::gate::{ApprovalSpec, Decision};
use crate::models::message::DecisionUpdate;

// ── Delivery Target ──────────────────────────────────────────

/// Where a gated task listens for its decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTarget {
    pub address: IpAddr,
    pub port: u16,
    pub access_path: String,
}

impl DeliveryTarget {
    pub fn from_spec(spec: &ApprovalSpec) -> Result<Self, DeliveryError> {
        let address = spec
            .pod_ip
            .parse()
            .map_err(|_| DeliveryError::InvalidTarget(format!("podIP({})", spec.pod_ip)))?;
        let port = u16::try_from(spec.port)
            .map_err(|_| DeliveryError::InvalidTarget(format!("port({})", spec.port)))?;
        Ok(Self {
            address,
            port,
            access_path: spec.access_path.clone(),
        })
    }

    pub fn url(&self) -> String {
        let path = if self.access_path.starts_with('/') {
            self.access_path.clone()
        } else {
            format!("/{}", self.access_path)
        };
        format!("http://{}{}", SocketAddr::new(self.address, self.port), path)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid delivery target: {0}")]
    InvalidTarget(String),

    #[error("decision delivery to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

// ── Decision Sender ──────────────────────────────────────────

/// Delivers a final decision to a gated task.
///
/// Implementations must be safe to call more than once for the same gate: a
/// reconciliation retry can re-deliver after the status write failed.
#[async_trait]
pub trait DecisionSender: Send + Sync {
    async fn deliver(&self, target: &DeliveryTarget, decision: Decision)
        -> Result<(), DeliveryError>;
}

/// Sends `PUT {decision}` to the task over HTTP.
///
/// Any response counts as delivered; the status code is logged but not
/// inspected. Only transport failures are errors.
#[derive(Clone)]
pub struct HttpDecisionClient {
    client: reqwest::Client,
}

impl HttpDecisionClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("approval-gate/1.0")
                .build()?,
        })
    }
}

#[async_trait]
impl DecisionSender for HttpDecisionClient {
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        decision: Decision,
    ) -> Result<(), DeliveryError> {
        let url = target.url();
        let result = self
            .client
            .put(&url)
            .json(&DecisionUpdate::new(decision))
            .send()
            .await;

        match result {
            Ok(resp) => {
                info!(
                    url = %url,
                    decision = %decision,
                    status = %resp.status(),
                    "decision delivered"
                );
                Ok(())
            }
            Err(e) => {
                warn!(url = %url, decision = %decision, error = %e, "decision delivery failed");
                Err(DeliveryError::Transport { url, source: e })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ip: &str, port: i32, path: &str) -> ApprovalSpec {
        ApprovalSpec {
            pod_ip: ip.into(),
            port,
            access_path: path.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_target_url_ipv4() {
        let target = DeliveryTarget::from_spec(&spec("10.0.0.5", 10203, "/")).unwrap();
        assert_eq!(target.url(), "http://10.0.0.5:10203/");
    }

    #[test]
    fn test_target_url_ipv6_is_bracketed() {
        let target = DeliveryTarget::from_spec(&spec("fd00::1", 8080, "/decision")).unwrap();
        assert_eq!(target.url(), "http://[fd00::1]:8080/decision");
    }

    #[test]
    fn test_target_rejects_bad_values() {
        assert!(DeliveryTarget::from_spec(&spec("nope", 80, "/")).is_err());
        assert!(DeliveryTarget::from_spec(&spec("10.0.0.1", 70000, "/")).is_err());
    }
}
