use serde::{Deserialize, Serialize};

use crate::cluster::registry::{InstanceMetrics, InstanceStatus};

/// Limits past which an instance is degraded and skipped for new assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Fraction of `max_connections` in use, 0.0..=1.0
    pub max_connection_utilization: f64,
    pub max_error_rate: f64,
    pub max_response_time_ms: f64,
    pub max_cpu_percent: f32,
    pub max_memory_percent: f32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_connection_utilization: 0.85,
            max_error_rate: 0.05,
            max_response_time_ms: 500.0,
            max_cpu_percent: 90.0,
            max_memory_percent: 90.0,
        }
    }
}

impl HealthThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.max_connection_utilization) {
            return Err("max_connection_utilization must be between 0 and 1".into());
        }
        if !(0.0..=1.0).contains(&self.max_error_rate) {
            return Err("max_error_rate must be between 0 and 1".into());
        }
        if self.max_response_time_ms <= 0.0 {
            return Err("max_response_time_ms must be positive".into());
        }
        if !(0.0..=100.0).contains(&self.max_cpu_percent) || !(0.0..=100.0).contains(&self.max_memory_percent) {
            return Err("CPU and memory limits are percentages".into());
        }
        Ok(())
    }

    /// Status for the given metrics and the reasons behind a degradation.
    pub fn evaluate(&self, metrics: &InstanceMetrics) -> (InstanceStatus, Vec<String>) {
        let mut reasons = Vec::new();

        let utilization = metrics.connection_utilization();
        if utilization > self.max_connection_utilization {
            reasons.push(format!(
                "connection utilization {:.0}% exceeds {:.0}%",
                utilization * 100.0,
                self.max_connection_utilization * 100.0
            ));
        }
        if metrics.error_rate > self.max_error_rate {
            reasons.push(format!(
                "error rate {:.1}% exceeds {:.1}%",
                metrics.error_rate * 100.0,
                self.max_error_rate * 100.0
            ));
        }
        if metrics.avg_response_time_ms > self.max_response_time_ms {
            reasons.push(format!(
                "mean response time {:.0}ms exceeds {:.0}ms",
                metrics.avg_response_time_ms, self.max_response_time_ms
            ));
        }
        if metrics.cpu_percent > self.max_cpu_percent {
            reasons.push(format!("CPU {:.0}% exceeds {:.0}%", metrics.cpu_percent, self.max_cpu_percent));
        }
        if metrics.memory_percent > self.max_memory_percent {
            reasons.push(format!(
                "memory {:.0}% exceeds {:.0}%",
                metrics.memory_percent, self.max_memory_percent
            ));
        }

        let status = if reasons.is_empty() {
            InstanceStatus::Healthy
        } else {
            InstanceStatus::Degraded
        };
        (status, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(connections: usize) -> InstanceMetrics {
        InstanceMetrics {
            connections,
            max_connections: 100,
            ..InstanceMetrics::default()
        }
    }

    #[test]
    fn healthy_below_every_limit() {
        let (status, reasons) = HealthThresholds::default().evaluate(&metrics(10));
        assert_eq!(status, InstanceStatus::Healthy);
        assert!(reasons.is_empty());
    }

    #[test]
    fn degraded_reports_each_breach() {
        let mut m = metrics(95);
        m.error_rate = 0.2;
        let (status, reasons) = HealthThresholds::default().evaluate(&m);
        assert_eq!(status, InstanceStatus::Degraded);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let thresholds = HealthThresholds {
            max_connection_utilization: 1.5,
            ..HealthThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
