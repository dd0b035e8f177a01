//! Static fault knowledge: common causes, diagnostics, and remediation plans.

use crate::incident::FaultType;

#[derive(Debug, Clone, Copy)]
pub struct KnowledgeEntry {
    pub fault: FaultType,
    /// Most likely first.
    pub common_causes: &'static [&'static str],
    pub diagnostic_commands: &'static [&'static str],
    pub remediation_options: &'static [&'static str],
    /// Ordered, human-readable remediation steps.
    pub plan: &'static [&'static str],
}

pub const KNOWLEDGE_BASE: [KnowledgeEntry; 5] = [
    KnowledgeEntry {
        fault: FaultType::BgpLinkFlap,
        common_causes: &[
            "Physical link degradation (fiber, transceiver)",
            "MTU mismatch between peers",
            "Duplex/speed auto-negotiation issues",
            "BGP hold timer too aggressive",
            "Transceiver overheating",
        ],
        diagnostic_commands: &[
            "show interface transceiver",
            "show bgp neighbors",
            "show interface counters errors",
            "show logging last 100",
        ],
        remediation_options: &[
            "Adjust BGP timers (increase hold time)",
            "Enable BFD for faster detection",
            "Replace faulty transceiver",
            "Check and fix MTU settings",
        ],
        plan: &[
            "1. Increase BGP hold timer to 180 seconds",
            "2. Enable BFD for rapid failure detection",
            "3. Monitor for stability for 60 seconds",
            "4. If still flapping, shutdown and re-enable interface",
        ],
    },
    KnowledgeEntry {
        fault: FaultType::BgpSessionInstability,
        common_causes: &[
            "Route policy misconfiguration",
            "Prefix limit exceeded",
            "Authentication mismatch",
            "CPU overload affecting BGP process",
            "Route flapping from upstream",
        ],
        diagnostic_commands: &[
            "show bgp summary",
            "show route-policy",
            "show cpu processes",
            "show bgp neighbor detail",
        ],
        remediation_options: &[
            "Clear BGP session to reset state",
            "Adjust prefix limits",
            "Verify route policy configuration",
            "Enable route dampening",
        ],
        plan: &[
            "1. Clear BGP session to reset state",
            "2. Verify BGP neighbor configuration",
            "3. Check and adjust prefix limits if needed",
            "4. Monitor session state for 30 seconds",
        ],
    },
    KnowledgeEntry {
        fault: FaultType::TrafficDrop,
        common_causes: &[
            "Routing table corruption",
            "ECMP path failure",
            "ACL blocking traffic",
            "Buffer exhaustion",
            "Microbursts causing drops",
        ],
        diagnostic_commands: &[
            "show ip route",
            "show interfaces counters",
            "show acl",
            "show buffer",
        ],
        remediation_options: &[
            "Failover to backup path",
            "Clear routing table and reconverge",
            "Adjust buffer allocation",
            "Review and fix ACL rules",
        ],
        plan: &[
            "1. Check routing table integrity",
            "2. Failover traffic to backup path",
            "3. Clear routing table on affected device",
            "4. Force reconvergence",
            "5. Verify traffic restoration",
        ],
    },
    KnowledgeEntry {
        fault: FaultType::CpuSpike,
        common_causes: &[
            "Route churn/instability",
            "Control plane attack",
            "Memory leak in process",
            "Excessive logging",
            "Protocol storm",
        ],
        diagnostic_commands: &["show cpu processes", "show memory", "show copp statistics"],
        remediation_options: &[
            "Enable CoPP rate limiting",
            "Restart offending process",
            "Reduce logging verbosity",
            "Apply control plane protection",
        ],
        plan: &[
            "1. Identify top CPU-consuming process",
            "2. Enable CoPP rate limiting",
            "3. Restart offending process if safe",
            "4. Monitor CPU for recovery",
        ],
    },
    KnowledgeEntry {
        fault: FaultType::MemoryExhaustion,
        common_causes: &[
            "Route table overflow",
            "Memory leak in application",
            "Too many BGP routes",
            "Configuration bloat",
        ],
        diagnostic_commands: &["show memory", "show bgp summary", "show running-config"],
        remediation_options: &[
            "Clear stale routes",
            "Restart memory-leaking process",
            "Apply route summarization",
            "Increase prefix filtering",
        ],
        plan: &[
            "1. Clear stale routes and caches",
            "2. Apply route summarization",
            "3. Restart if memory doesn't recover",
            "4. Monitor memory utilization",
        ],
    },
];

/// Plan used when no knowledge exists for the fault.
pub const FALLBACK_PLAN: &[&str] = &[
    "1. Gather additional diagnostics",
    "2. Escalate to human operator",
];

pub fn lookup(fault: FaultType) -> Option<&'static KnowledgeEntry> {
    KNOWLEDGE_BASE.iter().find(|k| k.fault == fault)
}

pub fn plan_for(fault: FaultType) -> Vec<String> {
    lookup(fault)
        .map(|k| k.plan)
        .unwrap_or(FALLBACK_PLAN)
        .iter()
        .map(|s| s.to_string())
        .collect()
}
