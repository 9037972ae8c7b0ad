use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Metadata kept for a connected operator.
#[derive(Debug, Clone)]
pub struct OperatorInfo {
    pub client_id: String,
    pub group: String,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub tasks_processed: u64,
}

impl OperatorInfo {
    fn new(client_id: String, group: String) -> Self {
        let now = Utc::now();
        Self { client_id, group, joined_at: now, last_activity: now, tasks_processed: 0 }
    }
}

/// Optional shared-secret gate for operator registration, matching the
/// source's `ARQONBUS_OPERATOR_AUTH_REQUIRED` / `ARQONBUS_OPERATOR_AUTH_TOKEN`
/// pair.
pub struct OperatorAuth {
    pub required: bool,
    pub token: Option<String>,
}

impl OperatorAuth {
    pub fn disabled() -> Self {
        Self { required: false, token: None }
    }

    fn check(&self, presented: &str) -> bool {
        if !self.required {
            return true;
        }
        match &self.token {
            Some(expected) if !expected.is_empty() => presented == expected,
            _ => false,
        }
    }
}

struct GroupState {
    operators: HashMap<String, OperatorInfo>,
    next_index: AtomicU64,
}

impl GroupState {
    fn new() -> Self {
        Self { operators: HashMap::new(), next_index: AtomicU64::new(0) }
    }
}

/// Tracks active operators and their group membership, enabling both
/// round-robin and competing dispatch over a capability group.
pub struct OperatorRegistry {
    groups: RwLock<HashMap<String, GroupState>>,
    client_to_group: RwLock<HashMap<String, String>>,
    auth: OperatorAuth,
}

impl OperatorRegistry {
    pub fn new(auth: OperatorAuth) -> Self {
        Self { groups: RwLock::new(HashMap::new()), client_to_group: RwLock::new(HashMap::new()), auth }
    }

    /// Registers `client_id` as an operator for `group`. Returns `false`
    /// (never an error) when auth is required and the presented token
    /// doesn't match, matching the source's reject-by-returning-false
    /// behavior.
    pub async fn register(&self, client_id: &str, group: &str, auth_token: &str) -> bool {
        if !self.auth.check(auth_token) {
            warn!(client_id, group, "operator failed auth");
            return false;
        }

        let mut groups = self.groups.write().await;
        let state = groups.entry(group.to_string()).or_insert_with(GroupState::new);
        state.operators.insert(client_id.to_string(), OperatorInfo::new(client_id.to_string(), group.to_string()));
        drop(groups);

        self.client_to_group.write().await.insert(client_id.to_string(), group.to_string());
        info!(client_id, group, "operator joined");
        true
    }

    /// Idempotent: unregistering an operator that never joined is a no-op.
    pub async fn unregister(&self, client_id: &str) {
        let Some(group) = self.client_to_group.write().await.remove(client_id) else {
            return;
        };

        let mut groups = self.groups.write().await;
        if let Some(state) = groups.get_mut(&group) {
            state.operators.remove(client_id);
            if state.operators.is_empty() {
                groups.remove(&group);
            }
        }
        info!(client_id, group, "operator left");
    }

    pub async fn operators_in(&self, group: &str) -> Vec<String> {
        let groups = self.groups.read().await;
        groups.get(group).map(|s| s.operators.keys().cloned().collect()).unwrap_or_default()
    }

    /// Picks the next operator in `group` by rotating a per-group index,
    /// so repeated calls cycle evenly rather than favoring one worker.
    pub async fn next_round_robin(&self, group: &str) -> Option<String> {
        let groups = self.groups.read().await;
        let state = groups.get(group)?;
        if state.operators.is_empty() {
            return None;
        }
        let mut ids: Vec<&String> = state.operators.keys().collect();
        ids.sort();
        let index = state.next_index.fetch_add(1, Ordering::Relaxed) as usize % ids.len();
        Some(ids[index].clone())
    }

    pub async fn record_task(&self, client_id: &str) {
        let Some(group) = self.client_to_group.read().await.get(client_id).cloned() else {
            return;
        };
        let mut groups = self.groups.write().await;
        if let Some(state) = groups.get_mut(&group) {
            if let Some(info) = state.operators.get_mut(client_id) {
                info.tasks_processed += 1;
                info.last_activity = Utc::now();
            }
        }
    }

    pub async fn group_count(&self, group: &str) -> usize {
        self.groups.read().await.get(group).map(|s| s.operators.len()).unwrap_or(0)
    }

    pub async fn total_operators(&self) -> usize {
        self.client_to_group.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_without_auth_requirement_always_succeeds() {
        let registry = OperatorRegistry::new(OperatorAuth::disabled());
        assert!(registry.register("op-1", "code.python", "").await);
        assert_eq!(registry.operators_in("code.python").await, vec!["op-1".to_string()]);
    }

    #[tokio::test]
    async fn register_with_wrong_token_is_rejected() {
        let registry = OperatorRegistry::new(OperatorAuth { required: true, token: Some("secret".to_string()) });
        assert!(!registry.register("op-1", "code.python", "wrong").await);
        assert!(registry.operators_in("code.python").await.is_empty());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = OperatorRegistry::new(OperatorAuth::disabled());
        registry.unregister("ghost").await;
        assert_eq!(registry.total_operators().await, 0);
    }

    #[tokio::test]
    async fn round_robin_cycles_through_all_members() {
        let registry = OperatorRegistry::new(OperatorAuth::disabled());
        registry.register("op-1", "group", "").await;
        registry.register("op-2", "group", "").await;

        let first = registry.next_round_robin("group").await.unwrap();
        let second = registry.next_round_robin("group").await.unwrap();
        let third = registry.next_round_robin("group").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }
}
