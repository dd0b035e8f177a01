//! Static fault signatures: which metrics implicate which fault class.

use crate::incident::FaultType;

#[derive(Debug, Clone, Copy)]
pub struct FaultSignature {
    pub fault: FaultType,
    pub metrics: &'static [&'static str],
    pub conditions: &'static [&'static str],
    pub description: &'static str,
}

impl FaultSignature {
    pub fn matches_metric(&self, metric: &str) -> bool {
        self.metrics.contains(&metric)
    }
}

pub const SIGNATURES: [FaultSignature; 5] = [
    FaultSignature {
        fault: FaultType::BgpLinkFlap,
        metrics: &["bgp_session_state", "link_flap_count"],
        conditions: &["rapid_state_changes", "interface_errors"],
        description: "BGP session flapping due to unstable physical or logical link",
    },
    FaultSignature {
        fault: FaultType::BgpSessionInstability,
        metrics: &["bgp_session_state", "bgp_prefixes_received"],
        conditions: &["session_down", "prefix_withdrawal"],
        description: "BGP session instability without physical link issues",
    },
    FaultSignature {
        fault: FaultType::TrafficDrop,
        metrics: &["traffic_utilization", "packet_loss"],
        conditions: &["sudden_traffic_decrease", "packet_loss_spike"],
        description: "Unexpected traffic drop indicating routing or forwarding issues",
    },
    FaultSignature {
        fault: FaultType::CpuSpike,
        metrics: &["cpu_utilization"],
        conditions: &["cpu_above_threshold"],
        description: "CPU utilization spike affecting device performance",
    },
    FaultSignature {
        fault: FaultType::MemoryExhaustion,
        metrics: &["memory_utilization"],
        conditions: &["memory_above_threshold"],
        description: "Memory utilization approaching critical levels",
    },
];

pub fn signature_for(fault: FaultType) -> Option<&'static FaultSignature> {
    SIGNATURES.iter().find(|s| s.fault == fault)
}
