//! Evidence-weighted fault classification.
//!
//! Each known fault class accumulates a score from the anomalies whose
//! metric appears in its signature, plus a bonus for the operator's claim
//! and for a stopped node. The highest score wins; on a tie the class that
//! comes first in [`FaultType::ALL`] wins, which is deterministic but has
//! no diagnostic meaning.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::signature::SIGNATURES;
use crate::incident::{AnomalySeverity, FaultType};
use crate::tools::{Anomaly, NodeStatus};

const UNKNOWN_BIAS: f64 = 0.1;
const ANOMALY_WEIGHT: f64 = 0.3;
const CRITICAL_MULTIPLIER: f64 = 1.5;
const CLAIM_BONUS: f64 = 0.4;
const OFFLINE_SESSION_BONUS: f64 = 0.3;
const OFFLINE_TRAFFIC_BONUS: f64 = 0.2;

/// How the fault came to be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MetricAnomalyDetection,
    OperatorReported,
    ProactiveAnalysis,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::MetricAnomalyDetection => "metric_anomaly_detection",
            DetectionMethod::OperatorReported => "operator_reported",
            DetectionMethod::ProactiveAnalysis => "proactive_analysis",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub fault_type: FaultType,
    /// Winning score clamped to [0, 1].
    pub confidence: f64,
    pub method: DetectionMethod,
    /// Raw score per class in [`FaultType::ALL`] order.
    pub scores: Vec<(FaultType, f64)>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EvidenceScorer;

impl EvidenceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        claimed: FaultType,
        anomalies: &[Anomaly],
        node_status: Option<NodeStatus>,
    ) -> Classification {
        let mut scores: Vec<(FaultType, f64)> = FaultType::ALL
            .iter()
            .map(|&ft| (ft, if ft.is_known() { 0.0 } else { UNKNOWN_BIAS }))
            .collect();

        let mut bump = |fault: FaultType, amount: f64| {
            if let Some(entry) = scores.iter_mut().find(|(ft, _)| *ft == fault) {
                entry.1 += amount;
            }
        };

        for anomaly in anomalies {
            let weight = match anomaly.severity {
                AnomalySeverity::Critical => CRITICAL_MULTIPLIER,
                _ => 1.0,
            };
            for signature in SIGNATURES.iter().filter(|s| s.matches_metric(&anomaly.metric)) {
                bump(signature.fault, ANOMALY_WEIGHT * weight);
            }
        }

        if claimed.is_known() {
            bump(claimed, CLAIM_BONUS);
        }

        if node_status.is_some_and(|s| s.is_offline()) {
            bump(FaultType::BgpSessionInstability, OFFLINE_SESSION_BONUS);
            bump(FaultType::TrafficDrop, OFFLINE_TRAFFIC_BONUS);
        }

        // Strict comparison keeps the earliest class on ties.
        let (fault_type, best) = scores
            .iter()
            .copied()
            .fold((FaultType::Unknown, f64::MIN), |acc, (ft, score)| {
                if score > acc.1 {
                    (ft, score)
                } else {
                    acc
                }
            });

        let method = if !anomalies.is_empty() {
            DetectionMethod::MetricAnomalyDetection
        } else if claimed.is_known() {
            DetectionMethod::OperatorReported
        } else {
            DetectionMethod::ProactiveAnalysis
        };

        Classification {
            fault_type,
            confidence: best.clamp(0.0, 1.0),
            method,
            scores,
        }
    }
}
