use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status reported by the health registry for a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
    Maintenance,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
            CheckStatus::Maintenance => "maintenance",
        };
        f.write_str(s)
    }
}

/// One monitored service instance as reported by the health registry.
///
/// Field names follow the registry's own JSON so the same type reads the
/// live health response and the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    pub node: String,
    #[serde(rename = "CheckID", default)]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub output: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
}

impl HealthCheck {
    pub fn new(node: &str, service_id: &str, status: CheckStatus) -> HealthCheck {
        HealthCheck {
            node: node.to_string(),
            check_id: format!("service:{}", service_id),
            name: format!("Service '{}' check", service_id),
            status,
            notes: String::new(),
            output: String::new(),
            service_id: service_id.to_string(),
            service_name: service_id.to_string(),
        }
    }

    /// Checks are matched by service identifier only.
    pub fn same_service(&self, other: &HealthCheck) -> bool {
        self.service_id == other.service_id
    }
}

/// Insertion-ordered set of checks, unique by service identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CheckSet {
    checks: Vec<HealthCheck>,
}

impl CheckSet {
    pub fn new() -> CheckSet {
        CheckSet { checks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HealthCheck> {
        self.checks.iter()
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.position(service_id).is_some()
    }

    pub fn get(&self, service_id: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.service_id == service_id)
    }

    /// Appends the check unless its service is already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, check: HealthCheck) -> bool {
        if self.contains(&check.service_id) {
            return false;
        }
        self.checks.push(check);
        true
    }

    /// Removes the check for `service_id`, keeping the order of the rest.
    pub fn remove(&mut self, service_id: &str) -> Option<HealthCheck> {
        let i = self.position(service_id)?;
        Some(self.checks.remove(i))
    }

    /// Service identifiers in set order.
    pub fn service_ids(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.service_id.as_str()).collect()
    }

    /// Equality by service-identifier membership, ignoring order and content.
    pub fn same_members(&self, other: &CheckSet) -> bool {
        self.len() == other.len() && self.iter().all(|c| other.contains(&c.service_id))
    }

    fn position(&self, service_id: &str) -> Option<usize> {
        self.checks.iter().position(|c| c.service_id == service_id)
    }
}

impl FromIterator<HealthCheck> for CheckSet {
    fn from_iter<I: IntoIterator<Item = HealthCheck>>(iter: I) -> Self {
        let mut set = CheckSet::new();
        for check in iter {
            set.insert(check);
        }
        set
    }
}

// Decoded lists go through `FromIterator` so duplicates collapse.
impl<'de> Deserialize<'de> for CheckSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<HealthCheck>::deserialize(deserializer).map(CheckSet::from_iter)
    }
}

impl IntoIterator for CheckSet {
    type Item = HealthCheck;
    type IntoIter = std::vec::IntoIter<HealthCheck>;

    fn into_iter(self) -> Self::IntoIter {
        self.checks.into_iter()
    }
}

impl<'a> IntoIterator for &'a CheckSet {
    type Item = &'a HealthCheck;
    type IntoIter = std::slice::Iter<'a, HealthCheck>;

    fn into_iter(self) -> Self::IntoIter {
        self.checks.iter()
    }
}

/// A change of one check between failing and not failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    BecamePassing(HealthCheck),
    BecameCritical(HealthCheck),
}

impl Transition {
    pub fn check(&self) -> &HealthCheck {
        match self {
            Transition::BecamePassing(check) | Transition::BecameCritical(check) => check,
        }
    }
}

/// Transitions produced by one tick: passing first, then critical.
pub type Batch = Vec<Transition>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_registry_payload() {
        let raw = r#"[{
            "Node": "node-1",
            "CheckID": "service:web-1",
            "Name": "Service 'web' check",
            "Status": "critical",
            "Notes": "",
            "Output": "connection refused",
            "ServiceID": "web-1",
            "ServiceName": "web",
            "ServiceTags": ["primary"],
            "CreateIndex": 10,
            "ModifyIndex": 12
        }]"#;
        let set: CheckSet = serde_json::from_str(raw).unwrap();
        let check = set.get("web-1").unwrap();
        assert_eq!(check.node, "node-1");
        assert_eq!(check.status, CheckStatus::Critical);
        assert_eq!(check.output, "connection refused");
        assert_eq!(check.service_name, "web");
    }

    #[test]
    fn snapshot_uses_registry_field_names() {
        let set: CheckSet = vec![HealthCheck::new("n1", "svc1", CheckStatus::Critical)]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&set).unwrap();
        let first = &json[0];
        assert_eq!(first["ServiceID"], "svc1");
        assert_eq!(first["Status"], "critical");
        assert_eq!(first["Node"], "n1");
    }

    #[test]
    fn first_occurrence_wins() {
        let mut dup = HealthCheck::new("n2", "svc1", CheckStatus::Warning);
        dup.notes = "second".to_string();
        let set: CheckSet = vec![HealthCheck::new("n1", "svc1", CheckStatus::Critical), dup]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("svc1").unwrap().node, "n1");
    }

    #[test]
    fn decoding_drops_duplicate_services() {
        let raw = r#"[
            {"Node": "n1", "ServiceID": "svc1", "Status": "critical"},
            {"Node": "n2", "ServiceID": "svc2", "Status": "critical"},
            {"Node": "n3", "ServiceID": "svc1", "Status": "warning"}
        ]"#;
        let set: CheckSet = serde_json::from_str(raw).unwrap();
        assert_eq!(set.service_ids(), vec!["svc1", "svc2"]);
        assert_eq!(set.get("svc1").unwrap().node, "n1");
    }

    #[test]
    fn remove_keeps_order() {
        let mut set: CheckSet = ["a", "b", "c"]
            .iter()
            .map(|id| HealthCheck::new("n", id, CheckStatus::Critical))
            .collect();
        assert!(set.remove("b").is_some());
        assert!(set.remove("b").is_none());
        assert_eq!(set.service_ids(), vec!["a", "c"]);
    }
}
