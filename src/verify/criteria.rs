//! Static per-fault verification criteria.

use crate::incident::FaultType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub check_name: &'static str,
    pub description: &'static str,
    pub metric: &'static str,
    /// Condition in the comparator grammar of [`super::condition`].
    pub expected: &'static str,
    pub critical: bool,
}

const BGP_LINK_FLAP: &[Criterion] = &[
    Criterion {
        check_name: "bgp_session_stable",
        description: "BGP session is established and stable",
        metric: "bgp_session_state",
        expected: "1",
        critical: true,
    },
    Criterion {
        check_name: "no_new_flaps",
        description: "No BGP flaps in last 60 seconds",
        metric: "bgp_flap_count_1m",
        expected: "0",
        critical: true,
    },
    Criterion {
        check_name: "interface_no_errors",
        description: "Interface error rate is below threshold",
        metric: "interface_error_rate",
        expected: "<10",
        critical: false,
    },
];

const BGP_SESSION_INSTABILITY: &[Criterion] = &[
    Criterion {
        check_name: "bgp_session_established",
        description: "BGP session is in Established state",
        metric: "bgp_session_state",
        expected: "1",
        critical: true,
    },
    Criterion {
        check_name: "prefixes_received",
        description: "Receiving expected prefixes from neighbor",
        metric: "bgp_prefixes_received",
        expected: ">0",
        critical: true,
    },
];

const TRAFFIC_DROP: &[Criterion] = &[
    Criterion {
        check_name: "traffic_restored",
        description: "Traffic throughput restored to baseline",
        metric: "traffic_utilization",
        expected: ">50",
        critical: true,
    },
    Criterion {
        check_name: "no_packet_loss",
        description: "Packet loss is within acceptable range",
        metric: "packet_loss_rate",
        expected: "<1",
        critical: true,
    },
];

const CPU_SPIKE: &[Criterion] = &[Criterion {
    check_name: "cpu_normal",
    description: "CPU utilization is below threshold",
    metric: "cpu_utilization",
    expected: "<80",
    critical: true,
}];

const MEMORY_EXHAUSTION: &[Criterion] = &[Criterion {
    check_name: "memory_normal",
    description: "Memory utilization is below threshold",
    metric: "memory_utilization",
    expected: "<85",
    critical: true,
}];

pub fn criteria_for(fault: FaultType) -> &'static [Criterion] {
    match fault {
        FaultType::BgpLinkFlap => BGP_LINK_FLAP,
        FaultType::BgpSessionInstability => BGP_SESSION_INSTABILITY,
        FaultType::TrafficDrop => TRAFFIC_DROP,
        FaultType::CpuSpike => CPU_SPIKE,
        FaultType::MemoryExhaustion => MEMORY_EXHAUSTION,
        FaultType::Unknown => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::condition::Condition;

    #[test]
    fn test_all_expectations_parse() {
        for fault in FaultType::ALL {
            for criterion in criteria_for(fault) {
                assert!(
                    criterion.expected.parse::<Condition>().is_ok(),
                    "{} has unparseable expectation",
                    criterion.check_name
                );
            }
        }
    }

    #[test]
    fn test_only_interface_errors_is_advisory() {
        let advisory: Vec<_> = FaultType::ALL
            .iter()
            .flat_map(|&f| criteria_for(f))
            .filter(|c| !c.critical)
            .map(|c| c.check_name)
            .collect();
        assert_eq!(advisory, vec!["interface_no_errors"]);
    }
}
