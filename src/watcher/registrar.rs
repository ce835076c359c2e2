use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::WatcherConfig;
use crate::models::message::RegistrationMessage;
use crate::notification::RegistrationClient;

/// Build the registration for this task. The gate takes the task's host name
/// as its name.
pub fn registration(
    cfg: &WatcherConfig,
    task_name: String,
    address: IpAddr,
    users: BTreeMap<String, String>,
) -> RegistrationMessage {
    RegistrationMessage {
        namespace: cfg.namespace.clone(),
        task_name,
        address: address.to_string(),
        access_path: cfg.access_path.clone(),
        port: i32::from(cfg.listen_port),
        threshold: cfg.threshold,
        users,
    }
}

/// Register exactly once. There is no retry: a task that cannot register has
/// nobody to wait for and should fail.
pub async fn register(client: &RegistrationClient, msg: &RegistrationMessage) -> anyhow::Result<()> {
    tracing::info!(
        url = client.url(),
        namespace = %msg.namespace,
        task = %msg.task_name,
        threshold = msg.threshold,
        approvers = msg.users.len(),
        "registering approval"
    );
    client.register(msg).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> WatcherConfig {
        WatcherConfig {
            operator_url: "http://127.0.0.1:1/approval/".into(),
            threshold: 2,
            users_file: "/tmp/config/users".into(),
            listen_port: 10203,
            access_path: "/".into(),
            exit_delay: Duration::from_secs(5),
            namespace: "ci".into(),
            pod_ip: None,
            hostname: None,
            request_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_registration_carries_listener_settings() {
        let users = BTreeMap::from([("alice".to_string(), "a".to_string())]);
        let msg = registration(&cfg(), "build-42".into(), "10.0.0.7".parse().unwrap(), users);
        assert_eq!(msg.namespace, "ci");
        assert_eq!(msg.task_name, "build-42");
        assert_eq!(msg.address, "10.0.0.7");
        assert_eq!(msg.port, 10203);
        assert_eq!(msg.threshold, 2);
        assert_eq!(msg.access_path, "/");
        assert_eq!(msg.to_spec().users.len(), 1);
    }
}
