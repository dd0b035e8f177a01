//! Root-cause engine: evidence, confidence, plan, and risk.

use serde::Serialize;

use super::knowledge;
use crate::incident::{FaultType, MetricDeviation, RiskLevel};

const BASE_CONFIDENCE: f64 = 0.3;
const PER_EVIDENCE: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.95;

/// Plan keywords that mark a step as disruptive.
const DISRUPTIVE_KEYWORDS: [&str; 4] = ["restart", "reload", "failover", "shutdown"];

/// Raw device output gathered for analysis. Empty when the device command
/// did not succeed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub bgp_summary: String,
    pub interface_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCauseAnalysis {
    pub root_cause: String,
    pub hypothesis: String,
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub plan: Vec<String>,
    pub risk: RiskLevel,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RootCauseEngine;

impl RootCauseEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        fault: FaultType,
        deviations: &[MetricDeviation],
        diagnostics: &Diagnostics,
    ) -> RootCauseAnalysis {
        let evidence = gather_evidence(deviations, diagnostics);

        // First listed cause. A table lookup; the evidence does not rank it.
        let root_cause = knowledge::lookup(fault)
            .and_then(|k| k.common_causes.first())
            .map(|c| c.to_string())
            .unwrap_or_else(|| format!("Unknown cause for {fault}"));

        let hypothesis = format!(
            "Based on {} pieces of evidence, the most likely cause is: {}",
            evidence.len(),
            root_cause
        );
        let confidence = confidence_for(evidence.len());
        let plan = knowledge::plan_for(fault);
        let risk = assess_risk(&plan);

        RootCauseAnalysis {
            root_cause,
            hypothesis,
            evidence,
            confidence,
            plan,
            risk,
        }
    }
}

pub fn gather_evidence(deviations: &[MetricDeviation], diagnostics: &Diagnostics) -> Vec<String> {
    let mut evidence: Vec<String> = deviations
        .iter()
        .map(|d| format!("Metric '{}' deviated by {:.1} sigma", d.metric_name, d.deviation_sigma))
        .collect();

    if diagnostics.bgp_summary.contains("Active") || diagnostics.bgp_summary.contains("never") {
        evidence.push("BGP neighbor in Active/Down state detected".into());
    }
    if diagnostics.interface_status.to_lowercase().contains("down") {
        evidence.push("Interface in down state detected".into());
    }
    evidence
}

pub fn confidence_for(evidence_count: usize) -> f64 {
    (BASE_CONFIDENCE + PER_EVIDENCE * evidence_count as f64).min(MAX_CONFIDENCE)
}

/// Medium if any step mentions a disruptive operation, otherwise low.
/// Never returns `High`.
pub fn assess_risk(plan: &[String]) -> RiskLevel {
    let disruptive = plan.iter().any(|step| {
        let step = step.to_lowercase();
        DISRUPTIVE_KEYWORDS.iter().any(|k| step.contains(k))
    });
    if disruptive {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
