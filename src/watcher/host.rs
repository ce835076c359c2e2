//! What a task knows about itself: address, host name, permitted approvers.

use std::collections::BTreeMap;
use std::net::{IpAddr, UdpSocket};
use std::path::Path;

use anyhow::Context;

/// Parse `user=label` lines. Blank lines and `#` comments are skipped; the
/// label may itself contain `=`.
pub fn parse_users(contents: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut users = BTreeMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (user, label) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected user=label, got {:?}", lineno + 1, line))?;
        let user = user.trim();
        if user.is_empty() {
            anyhow::bail!("line {}: empty user id", lineno + 1);
        }
        if users
            .insert(user.to_string(), label.trim().to_string())
            .is_some()
        {
            anyhow::bail!("line {}: duplicated user id({})", lineno + 1, user);
        }
    }
    Ok(users)
}

pub fn read_users(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not open users file {}", path.display()))?;
    parse_users(&contents)
}

/// Address other pods reach this one on: the source address of the default
/// route. No packet is sent.
pub fn local_ip() -> anyhow::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("bind local address socket")?;
    socket
        .connect("8.8.8.8:80")
        .context("no route to determine local address")?;
    Ok(socket.local_addr()?.ip())
}

pub fn hostname(override_name: Option<&str>) -> anyhow::Result<String> {
    if let Some(name) = override_name {
        return Ok(name.to_string());
    }
    let name = std::fs::read_to_string("/etc/hostname").context("could not read /etc/hostname")?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("/etc/hostname is empty");
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_users() {
        let users = parse_users("alice=alice@example.com\n\n# ops\nbob = team=ops\n").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["alice"], "alice@example.com");
        assert_eq!(users["bob"], "team=ops");
    }

    #[test]
    fn test_parse_users_rejects_malformed_and_duplicate() {
        assert!(parse_users("alice").is_err());
        assert!(parse_users("=label").is_err());
        let err = parse_users("alice=a\nalice=b").unwrap_err();
        assert!(err.to_string().contains("duplicated user id(alice)"));
    }

    #[test]
    fn test_read_users_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users");
        std::fs::write(&path, "alice=a\nbob=b\n").unwrap();
        assert_eq!(read_users(&path).unwrap().len(), 2);
        assert!(read_users(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_hostname_override() {
        assert_eq!(hostname(Some("build-42")).unwrap(), "build-42");
    }
}
