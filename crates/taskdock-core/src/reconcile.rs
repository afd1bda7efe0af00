//! Pure derivation layer: per-task service policies and the UI-gating
//! predicates computed from registry state.
//!
//! The reconciler holds no state of its own. Which status counts as "the
//! service is reachable" differs per service (`Running` for most, `Served`
//! for ones with a separate serving phase), so it is policy, not code.

use std::collections::HashMap;

use crate::{Status, TaskRecord};

/// How one task type relates to its backing service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePolicy {
    /// Whether the task exposes an endpoint that must be probed for
    /// readiness before a redirect makes sense.
    pub needs_probe: bool,
    /// The terminal status that means "the endpoint accepts connections".
    pub ready_state: Status,
}

impl ServicePolicy {
    /// A task with a dedicated service endpoint.
    pub fn endpoint(ready_state: Status) -> Self {
        Self {
            needs_probe: true,
            ready_state,
        }
    }

    /// A task with no endpoint of its own: it is ready as soon as it runs.
    pub fn headless() -> Self {
        Self {
            needs_probe: false,
            ready_state: Status::Running,
        }
    }
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self::endpoint(Status::Running)
    }
}

/// Resolves a task name to its service policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyMap {
    default: ServicePolicy,
    overrides: HashMap<String, ServicePolicy>,
}

impl PolicyMap {
    pub fn new(default: ServicePolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, name: &str, policy: ServicePolicy) -> Self {
        self.overrides.insert(name.to_string(), policy);
        self
    }

    pub fn resolve(&self, name: &str) -> ServicePolicy {
        self.overrides.get(name).copied().unwrap_or(self.default)
    }
}

pub fn is_open(record: &TaskRecord) -> bool {
    record.status.is_open()
}

pub fn has_redirect_capability(record: &TaskRecord, policy: ServicePolicy) -> bool {
    is_open(record) && policy.needs_probe
}

pub fn redirect_enabled(record: &TaskRecord, policy: ServicePolicy) -> bool {
    is_open(record) && record.status == policy.ready_state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: Status) -> TaskRecord {
        TaskRecord {
            name: "jellyfin".to_string(),
            port: None,
            status,
        }
    }

    #[test]
    fn closed_tasks_never_enable_redirect() {
        let policy = ServicePolicy::default();
        let closed = record(Status::Closed);
        assert!(!is_open(&closed));
        assert!(!has_redirect_capability(&closed, policy));
        assert!(!redirect_enabled(&closed, policy));
    }

    #[test]
    fn redirect_waits_for_the_ready_state() {
        let policy = ServicePolicy::endpoint(Status::Running);
        assert!(!redirect_enabled(&record(Status::Loading), policy));
        assert!(redirect_enabled(&record(Status::Running), policy));
    }

    #[test]
    fn ready_state_is_policy_not_code() {
        let late = ServicePolicy::endpoint(Status::Served);
        assert!(!redirect_enabled(&record(Status::Running), late));
        assert!(redirect_enabled(&record(Status::Served), late));
    }

    #[test]
    fn headless_tasks_have_no_redirect() {
        let policy = ServicePolicy::headless();
        assert!(!has_redirect_capability(&record(Status::Running), policy));
    }

    #[test]
    fn policy_map_falls_back_to_the_default() {
        let policies = PolicyMap::new(ServicePolicy::endpoint(Status::Running))
            .with_policy("media", ServicePolicy::endpoint(Status::Served))
            .with_policy("backup", ServicePolicy::headless());

        assert_eq!(policies.resolve("media").ready_state, Status::Served);
        assert!(!policies.resolve("backup").needs_probe);
        assert_eq!(policies.resolve("anything-else").ready_state, Status::Running);
    }
}
