//! Round-robin selection across routable instances

use crate::instance::InstanceRecord;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Round-robin balancer with one rotating cursor per service name.
///
/// Each caller owns its balancer, so rotation fairness is per
/// (caller, service) rather than shared across the process. Selection is
/// deterministic: cursor order, no randomness.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: Mutex<HashMap<String, usize>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next routable instance of `service`, or `None` when the set
    /// holds nothing routable. Callers must treat `None` as "service
    /// unavailable", never as a fault.
    pub fn select(&self, service: &str, instances: &[InstanceRecord]) -> Option<InstanceRecord> {
        let routable: Vec<&InstanceRecord> =
            instances.iter().filter(|i| i.is_routable()).collect();
        if routable.is_empty() {
            return None;
        }

        let mut cursors = self
            .cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors.entry(service.to_string()).or_insert(0);
        let picked = routable[*cursor % routable.len()].clone();
        *cursor = cursor.wrapping_add(1);
        Some(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceStatus;

    fn record(id: &str, status: InstanceStatus) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            host: "10.0.0.1".to_string(),
            port: 9000,
            status,
        }
    }

    #[test]
    fn six_selects_over_three_instances_visit_each_twice() {
        let balancer = RoundRobin::new();
        let instances = vec![
            record("i1", InstanceStatus::Up),
            record("i2", InstanceStatus::Up),
            record("i3", InstanceStatus::Up),
        ];

        let picks: Vec<String> = (0..6)
            .map(|_| {
                balancer
                    .select("CAR-SVC", &instances)
                    .map(|i| i.instance_id)
                    .unwrap()
            })
            .collect();

        assert_eq!(picks, ["i1", "i2", "i3", "i1", "i2", "i3"]);
    }

    #[test]
    fn empty_set_yields_none() {
        let balancer = RoundRobin::new();
        assert_eq!(balancer.select("CAR-SVC", &[]), None);
    }

    #[test]
    fn non_up_instances_are_skipped() {
        let balancer = RoundRobin::new();
        let instances = vec![
            record("starting", InstanceStatus::Starting),
            record("up", InstanceStatus::Up),
            record("draining", InstanceStatus::OutOfService),
        ];

        for _ in 0..3 {
            let picked = balancer.select("CAR-SVC", &instances).unwrap();
            assert_eq!(picked.instance_id, "up");
        }
    }

    #[test]
    fn all_unroutable_yields_none() {
        let balancer = RoundRobin::new();
        let instances = vec![
            record("a", InstanceStatus::Starting),
            record("b", InstanceStatus::OutOfService),
        ];
        assert_eq!(balancer.select("CAR-SVC", &instances), None);
    }

    #[test]
    fn cursors_are_independent_per_service_name() {
        let balancer = RoundRobin::new();
        let cars = vec![
            record("c1", InstanceStatus::Up),
            record("c2", InstanceStatus::Up),
        ];
        let owners = vec![
            record("o1", InstanceStatus::Up),
            record("o2", InstanceStatus::Up),
        ];

        assert_eq!(
            balancer.select("CAR-SVC", &cars).unwrap().instance_id,
            "c1"
        );
        // A different service does not inherit the advanced cursor.
        assert_eq!(
            balancer.select("OWNER-SVC", &owners).unwrap().instance_id,
            "o1"
        );
        assert_eq!(
            balancer.select("CAR-SVC", &cars).unwrap().instance_id,
            "c2"
        );
    }
}
