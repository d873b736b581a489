//! Correlation table of issued commands

use cmdbridge_shared::now_ms;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A published command that has not been answered yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub uuid: String,
    /// Command variant name, e.g. `alarm_add_request`
    pub label: &'static str,
    pub device_id: String,
    pub issued_at: u64,
}

impl PendingCommand {
    /// Milliseconds since the command was issued
    pub fn age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.issued_at)
    }
}

/// Shared (uuid, device) -> command table; clones refer to the same table
///
/// A fan-out sends one uuid to several devices, so the device is part of the key.
#[derive(Debug, Clone, Default)]
pub struct PendingCommands {
    inner: Arc<RwLock<HashMap<(String, String), PendingCommand>>>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a command about to be published
    pub async fn register(&self, uuid: &str, label: &'static str, device_id: &str) {
        let pending = PendingCommand {
            uuid: uuid.to_string(),
            label,
            device_id: device_id.to_string(),
            issued_at: now_ms(),
        };
        self.inner
            .write()
            .await
            .insert((uuid.to_string(), device_id.to_string()), pending);
    }

    /// Remove and return the command a device's response answers
    pub async fn resolve(&self, uuid: &str, device_id: &str) -> Option<PendingCommand> {
        self.inner
            .write()
            .await
            .remove(&(uuid.to_string(), device_id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Commands still unanswered for one device
    pub async fn outstanding_for(&self, device_id: &str) -> Vec<PendingCommand> {
        let mut outstanding: Vec<PendingCommand> = self
            .inner
            .read()
            .await
            .values()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect();
        outstanding.sort_by_key(|c| c.issued_at);
        outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_removes_entry() {
        let pending = PendingCommands::new();
        pending.register("id-1", "alarm_list_request", "dev").await;

        assert!(pending.resolve("id-1", "other").await.is_none());
        let cmd = pending.resolve("id-1", "dev").await.unwrap();
        assert_eq!(cmd.label, "alarm_list_request");
        assert_eq!(cmd.device_id, "dev");
        assert!(pending.resolve("id-1", "dev").await.is_none());
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_fan_out_uuid_tracked_per_device() {
        let pending = PendingCommands::new();
        pending.register("id-1", "otamgr_update_request", "a").await;
        pending.register("id-1", "otamgr_update_request", "b").await;

        assert_eq!(pending.len().await, 2);
        assert!(pending.resolve("id-1", "a").await.is_some());
        assert_eq!(pending.outstanding_for("b").await.len(), 1);
        assert!(pending.outstanding_for("a").await.is_empty());
    }
}
