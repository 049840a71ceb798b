use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::cluster::node::NodeConfig;
use crate::cluster::policy::AssignmentPolicy;
use crate::config::settings::Settings;

#[derive(Debug, Deserialize)]
pub struct InstanceSettings {
    /// Stable id; a fresh one is generated per process when unset
    #[serde(default)]
    pub id: Option<String>,
    pub advertised_address: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize)]
pub struct ClusterSettings {
    pub heartbeat_interval_secs: u64,
    pub instance_ttl_multiplier: u32,
    pub lease_ttl_secs: u64,
    pub lease_renew_interval_secs: u64,
    pub lease_renew_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    pub assignment_policy: String,
}

#[derive(Debug, Deserialize)]
pub struct ViewerSettings {
    pub idle_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub channel_capacity: usize,
}

impl Settings {
    /// Runtime configuration of this instance. Fails on an unknown
    /// assignment policy, invalid thresholds, a lease that could expire
    /// between two renewals, or a viewer channel with no room.
    pub fn node_config(&self) -> Result<NodeConfig, String> {
        let cluster = &self.cluster;
        let policy: AssignmentPolicy = cluster.assignment_policy.parse()?;
        self.thresholds.validate()?;

        if cluster.lease_renew_interval_secs >= cluster.lease_ttl_secs {
            return Err(format!(
                "lease_renew_interval_secs ({}) must be shorter than lease_ttl_secs ({})",
                cluster.lease_renew_interval_secs, cluster.lease_ttl_secs
            ));
        }
        if cluster.instance_ttl_multiplier < 2 {
            return Err("instance_ttl_multiplier must be at least 2".into());
        }
        if self.viewers.channel_capacity == 0 {
            return Err("viewers.channel_capacity must be at least 1".into());
        }

        let heartbeat_interval = Duration::from_secs(cluster.heartbeat_interval_secs);
        let instance_id = self
            .instance
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(NodeConfig {
            instance_id,
            address: self.instance.advertised_address.clone(),
            max_connections: self.instance.max_connections,
            heartbeat_interval,
            instance_ttl: heartbeat_interval * cluster.instance_ttl_multiplier,
            lease_ttl: Duration::from_secs(cluster.lease_ttl_secs),
            lease_renew_interval: Duration::from_secs(cluster.lease_renew_interval_secs),
            lease_renew_timeout: Duration::from_millis(cluster.lease_renew_timeout_ms),
            sweep_interval: Duration::from_secs(cluster.sweep_interval_secs),
            policy,
            thresholds: self.thresholds.clone(),
            viewer_idle_timeout: Duration::from_secs(self.viewers.idle_timeout_secs),
            viewer_ping_interval: Duration::from_secs(self.viewers.ping_interval_secs),
            viewer_channel_capacity: self.viewers.channel_capacity,
            load_window: Duration::from_secs(60),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn base_settings() -> Settings {
        Config::builder()
            .add_source(File::from_str(include_str!("../../configuration/base.yml"), FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("base configuration should deserialize")
    }

    #[test]
    fn base_configuration_yields_node_config() {
        let config = base_settings().node_config().expect("valid configuration");
        assert_eq!(config.policy, AssignmentPolicy::LeastConnections);
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.instance_ttl, Duration::from_secs(45));
        assert!(!config.instance_id.is_empty());
    }

    #[test]
    fn renewal_must_fit_inside_the_lease() {
        let mut settings = base_settings();
        settings.cluster.lease_renew_interval_secs = settings.cluster.lease_ttl_secs;
        assert!(settings.node_config().is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let mut settings = base_settings();
        settings.cluster.assignment_policy = "random".into();
        assert!(settings.node_config().is_err());
    }

    #[test]
    fn empty_viewer_channel_is_rejected() {
        let mut settings = base_settings();
        settings.viewers.channel_capacity = 0;
        assert!(settings.node_config().is_err());
    }

    #[test]
    fn configured_instance_id_is_kept() {
        let mut settings = base_settings();
        settings.instance.id = Some("instance-7".into());
        assert_eq!(settings.node_config().map(|c| c.instance_id), Ok("instance-7".to_string()));
    }
}
