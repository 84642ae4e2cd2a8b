use crate::core::ent::{Batch, CheckSet, HealthCheck, Transition};

/// Outcome of one diff between the stored snapshot and the live failing set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub passing: Vec<HealthCheck>,
    pub critical: Vec<HealthCheck>,
    /// Snapshot to persist before the tick counts as done.
    pub snapshot: CheckSet,
}

impl Tick {
    pub fn is_empty(&self) -> bool {
        self.passing.is_empty() && self.critical.is_empty()
    }

    /// All passing transitions followed by all critical ones.
    pub fn into_batch(self) -> Batch {
        self.passing
            .into_iter()
            .map(Transition::BecamePassing)
            .chain(self.critical.into_iter().map(Transition::BecameCritical))
            .collect()
    }
}

/// Turns successive failing-check sets into binary transitions.
///
/// Checks are matched by service identifier. A check whose status, notes or
/// output change while it stays failing produces no transition, and the
/// snapshot keeps the content first seen.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> DiffEngine {
        DiffEngine
    }

    pub fn tick(&self, live: &CheckSet, prior: CheckSet) -> Tick {
        let mut snapshot = prior.clone();
        let mut passing = Vec::new();
        let mut critical = Vec::new();

        for check in prior {
            if live.contains(&check.service_id) {
                continue;
            }
            snapshot.remove(&check.service_id);
            tracing::info!(node = %check.node, service = %check.service_name, "check is passing");
            passing.push(check);
        }

        for check in live {
            if snapshot.contains(&check.service_id) {
                continue;
            }
            snapshot.insert(check.clone());
            tracing::info!(node = %check.node, service = %check.service_name, "check is failing");
            critical.push(check.clone());
        }

        Tick {
            passing,
            critical,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ent::CheckStatus;
    use proptest::prelude::*;

    fn set(ids: &[&str]) -> CheckSet {
        ids.iter()
            .map(|id| HealthCheck::new("node-1", id, CheckStatus::Critical))
            .collect()
    }

    fn ids(checks: &[HealthCheck]) -> Vec<&str> {
        checks.iter().map(|c| c.service_id.as_str()).collect()
    }

    #[test]
    fn new_failure_is_critical() {
        let tick = DiffEngine::new().tick(&set(&["svc1"]), set(&[]));
        assert_eq!(ids(&tick.critical), vec!["svc1"]);
        assert!(tick.passing.is_empty());
        assert_eq!(tick.snapshot.service_ids(), vec!["svc1"]);
    }

    #[test]
    fn recovered_check_is_passing() {
        let tick = DiffEngine::new().tick(&set(&[]), set(&["svc1"]));
        assert_eq!(ids(&tick.passing), vec!["svc1"]);
        assert!(tick.critical.is_empty());
        assert!(tick.snapshot.is_empty());
    }

    #[test]
    fn mixed_change() {
        let tick = DiffEngine::new().tick(&set(&["svc2", "svc3"]), set(&["svc1", "svc2"]));
        assert_eq!(ids(&tick.passing), vec!["svc1"]);
        assert_eq!(ids(&tick.critical), vec!["svc3"]);
        assert_eq!(tick.snapshot.service_ids(), vec!["svc2", "svc3"]);

        let batch = tick.into_batch();
        assert!(matches!(&batch[0], Transition::BecamePassing(c) if c.service_id == "svc1"));
        assert!(matches!(&batch[1], Transition::BecameCritical(c) if c.service_id == "svc3"));
    }

    #[test]
    fn content_change_while_failing_is_silent() {
        let prior = set(&["svc1"]);
        let mut changed = HealthCheck::new("node-1", "svc1", CheckStatus::Warning);
        changed.output = "still broken, differently".to_string();
        let live: CheckSet = vec![changed].into_iter().collect();

        let tick = DiffEngine::new().tick(&live, prior.clone());
        assert!(tick.is_empty());
        assert_eq!(tick.snapshot, prior);
    }

    #[test]
    fn consecutive_ticks_chain_snapshots() {
        let engine = DiffEngine::new();
        let live = set(&["svc1", "svc2"]);

        let first = engine.tick(&live, set(&[]));
        assert_eq!(first.critical.len(), 2);

        let second = engine.tick(&live, first.snapshot.clone());
        assert!(second.is_empty());
        assert_eq!(second.snapshot, first.snapshot);

        let replay = engine.tick(&live, set(&[]));
        assert_eq!(replay, first);
    }

    #[test]
    fn order_follows_input_order() {
        let tick = DiffEngine::new().tick(&set(&["z", "a", "m"]), set(&["q", "b"]));
        assert_eq!(ids(&tick.passing), vec!["q", "b"]);
        assert_eq!(ids(&tick.critical), vec!["z", "a", "m"]);
    }

    fn check_set() -> impl Strategy<Value = CheckSet> {
        prop::collection::vec("svc[0-9]", 0..8).prop_map(|ids| {
            ids.iter()
                .map(|id| HealthCheck::new("node-1", id, CheckStatus::Critical))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn snapshot_matches_live(prior in check_set(), live in check_set()) {
            let tick = DiffEngine::new().tick(&live, prior);
            prop_assert!(tick.snapshot.same_members(&live));
        }

        #[test]
        fn no_service_in_both_groups(prior in check_set(), live in check_set()) {
            let tick = DiffEngine::new().tick(&live, prior);
            for check in &tick.passing {
                prop_assert!(!tick.critical.iter().any(|c| c.same_service(check)));
            }
        }
    }
}
