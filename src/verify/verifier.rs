//! Evaluates verification criteria against live metrics and topology.
//!
//! Absence is permissive: a failed query, an empty result, or a node that
//! cannot be found all count as passing. Only a collaborator `Err` or a
//! value that violates its condition fails a check.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::condition::evaluate;
use super::criteria::{criteria_for, Criterion};
use crate::incident::{DeviceRef, FaultType, VerificationCheckResult};
use crate::tools::{device_selector, NodeStatus, Toolset};

/// Fraction of all checks, topology included, that must pass.
pub const PASS_RATIO: f64 = 0.8;
/// Fraction of passing samples for a device to count as stable.
pub const STABLE_RATIO: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub checks: Vec<VerificationCheckResult>,
    pub passed: bool,
    pub critical_passed: bool,
    pub checks_passed: usize,
    pub elapsed: Duration,
}

/// Outcome of repeated verification over an observation window.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityReport {
    pub stability_score: f64,
    pub checks_passed: usize,
    pub checks_total: usize,
    pub duration_seconds: f64,
    pub stable: bool,
}

pub struct Verifier<'a> {
    tools: &'a Toolset,
    settle: Duration,
}

impl<'a> Verifier<'a> {
    pub fn new(tools: &'a Toolset, settle: Duration) -> Self {
        Self { tools, settle }
    }

    pub async fn verify(&self, device: &DeviceRef, fault: FaultType) -> VerificationReport {
        let started = Instant::now();
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let mut checks = Vec::new();
        let mut critical_passed = true;

        for criterion in criteria_for(fault) {
            let check = self.check_metric(device, criterion).await;
            if !check.passed && criterion.critical {
                critical_passed = false;
            }
            checks.push(check);
        }
        checks.push(self.check_topology(device).await);

        let checks_passed = checks.iter().filter(|c| c.passed).count();
        let passed = critical_passed && checks_passed as f64 >= PASS_RATIO * checks.len() as f64;

        VerificationReport {
            checks,
            passed,
            critical_passed,
            checks_passed,
            elapsed: started.elapsed(),
        }
    }

    /// Re-run [`Verifier::verify`] once per `interval` across `window` and
    /// score the fraction of passing samples. A window shorter than one
    /// interval takes no samples and scores zero.
    pub async fn observe_stability(
        &self,
        device: &DeviceRef,
        fault: FaultType,
        window: Duration,
        interval: Duration,
    ) -> StabilityReport {
        let started = Instant::now();
        let samples = match interval.as_millis() {
            0 => 0,
            step => (window.as_millis() / step) as usize,
        };

        let mut checks_passed = 0;
        for n in 0..samples {
            if self.verify(device, fault).await.passed {
                checks_passed += 1;
            }
            if n + 1 < samples {
                tokio::time::sleep(interval).await;
            }
        }

        let stability_score = if samples == 0 {
            0.0
        } else {
            checks_passed as f64 / samples as f64
        };
        let stable = stability_score >= STABLE_RATIO;
        info!(
            device = %device.name,
            samples,
            checks_passed,
            stability_score,
            stable,
            "stability observed"
        );

        StabilityReport {
            stability_score,
            checks_passed,
            checks_total: samples,
            duration_seconds: started.elapsed().as_secs_f64(),
            stable,
        }
    }

    async fn check_metric(
        &self,
        device: &DeviceRef,
        criterion: &Criterion,
    ) -> VerificationCheckResult {
        let expr = device_selector(criterion.metric, &device.id);
        let (actual, passed) = match self.tools.metrics.query(&device.id, &expr).await {
            Ok(sample) if !sample.success => ("query_failed".to_string(), true),
            Ok(sample) => match sample.value {
                Some(value) => {
                    let passed = evaluate(&value, criterion.expected);
                    (value, passed)
                }
                None => ("no_data".to_string(), true),
            },
            Err(e) => {
                warn!(check = criterion.check_name, error = %e, "verification query errored");
                (format!("error: {e}"), false)
            }
        };
        debug!(check = criterion.check_name, %actual, passed, "verification check");

        VerificationCheckResult {
            check_name: criterion.check_name.to_string(),
            description: criterion.description.to_string(),
            expected: criterion.expected.to_string(),
            actual,
            passed,
            critical: criterion.critical,
            timestamp: Utc::now(),
        }
    }

    async fn check_topology(&self, device: &DeviceRef) -> VerificationCheckResult {
        let (actual, passed) = match self.tools.topology.find_node_by_name(&device.name).await {
            Ok(Some(node)) => (node.status.to_string(), node.status == NodeStatus::Started),
            Ok(None) => ("node_not_found".to_string(), true),
            Err(e) => (format!("error: {e}"), false),
        };

        VerificationCheckResult {
            check_name: "gns3_node_status".into(),
            description: "GNS3 node is in expected state".into(),
            expected: NodeStatus::Started.to_string(),
            actual,
            passed,
            critical: false,
            timestamp: Utc::now(),
        }
    }
}
