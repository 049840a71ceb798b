use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cluster::registry::InstanceRecord;

/// How a new owner is picked among healthy instances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicy {
    #[default]
    LeastConnections,
    LeastMatches,
    RoundRobin,
}

impl AssignmentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentPolicy::LeastConnections => "least_connections",
            AssignmentPolicy::LeastMatches => "least_matches",
            AssignmentPolicy::RoundRobin => "round_robin",
        }
    }

    /// `candidates` must be ordered by instance id; `cursor` only matters
    /// for round robin. Ties break on the other load figure, then on id.
    pub fn select<'a>(&self, candidates: &'a [InstanceRecord], cursor: usize) -> Option<&'a InstanceRecord> {
        match self {
            AssignmentPolicy::LeastConnections => candidates.iter().min_by(|a, b| {
                a.metrics
                    .connections
                    .cmp(&b.metrics.connections)
                    .then(a.metrics.owned_matches.cmp(&b.metrics.owned_matches))
                    .then(a.instance_id.cmp(&b.instance_id))
            }),
            AssignmentPolicy::LeastMatches => candidates.iter().min_by(|a, b| {
                a.metrics
                    .owned_matches
                    .cmp(&b.metrics.owned_matches)
                    .then(a.metrics.connections.cmp(&b.metrics.connections))
                    .then(a.instance_id.cmp(&b.instance_id))
            }),
            AssignmentPolicy::RoundRobin => {
                if candidates.is_empty() {
                    None
                } else {
                    candidates.get(cursor % candidates.len())
                }
            }
        }
    }
}

impl fmt::Display for AssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "least_connections" => Ok(AssignmentPolicy::LeastConnections),
            "least_matches" => Ok(AssignmentPolicy::LeastMatches),
            "round_robin" => Ok(AssignmentPolicy::RoundRobin),
            other => Err(format!(
                "unknown assignment policy '{}', expected least_connections, least_matches or round_robin",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::registry::{InstanceMetrics, InstanceStatus};
    use chrono::Utc;

    fn instance(id: &str, connections: usize, owned_matches: usize) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            address: format!("http://{}", id),
            status: InstanceStatus::Healthy,
            degraded_reasons: Vec::new(),
            metrics: InstanceMetrics {
                connections,
                max_connections: 1000,
                owned_matches,
                ..InstanceMetrics::default()
            },
            owned_matches: Vec::new(),
            started_at: Utc::now(),
            last_heartbeat: Utc::now(),
        }
    }

    #[test]
    fn least_connections_and_least_matches_pick_differently() {
        let candidates = vec![instance("a", 10, 1), instance("b", 2, 5)];
        let by_connections = AssignmentPolicy::LeastConnections.select(&candidates, 0).unwrap();
        let by_matches = AssignmentPolicy::LeastMatches.select(&candidates, 0).unwrap();
        assert_eq!(by_connections.instance_id, "b");
        assert_eq!(by_matches.instance_id, "a");
    }

    #[test]
    fn round_robin_cycles() {
        let candidates = vec![instance("a", 0, 0), instance("b", 0, 0), instance("c", 0, 0)];
        let picked: Vec<&str> = (0..4)
            .map(|cursor| {
                AssignmentPolicy::RoundRobin
                    .select(&candidates, cursor)
                    .unwrap()
                    .instance_id
                    .as_str()
            })
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn parses_config_names() {
        assert_eq!("round_robin".parse::<AssignmentPolicy>(), Ok(AssignmentPolicy::RoundRobin));
        assert!("random".parse::<AssignmentPolicy>().is_err());
    }
}
