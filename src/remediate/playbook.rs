//! Static remediation playbooks, one ordered action list per fault class.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::incident::{FaultType, RiskLevel};

const DEFAULT_INTERFACE: &str = "Ethernet8";
const DEFAULT_WEIGHT_NEIGHBOR: &str = "10.0.0.2";
const DEFAULT_WEIGHT: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AdjustBgpTimers,
    ClearInterfaceCounters,
    ClearBgpSession,
    SoftReconfiguration,
    FailoverPath,
    AdjustBgpWeight,
    EnableCopp,
    ReduceLogging,
    ClearRouteCache,
    ClearArpCache,
    ShutdownInterface,
    EnableInterface,
}

impl ActionKind {
    pub const ALL: [ActionKind; 12] = [
        ActionKind::AdjustBgpTimers,
        ActionKind::ClearInterfaceCounters,
        ActionKind::ClearBgpSession,
        ActionKind::SoftReconfiguration,
        ActionKind::FailoverPath,
        ActionKind::AdjustBgpWeight,
        ActionKind::EnableCopp,
        ActionKind::ReduceLogging,
        ActionKind::ClearRouteCache,
        ActionKind::ClearArpCache,
        ActionKind::ShutdownInterface,
        ActionKind::EnableInterface,
    ];

    pub fn from_name(name: &str) -> Option<ActionKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AdjustBgpTimers => "adjust_bgp_timers",
            ActionKind::ClearInterfaceCounters => "clear_interface_counters",
            ActionKind::ClearBgpSession => "clear_bgp_session",
            ActionKind::SoftReconfiguration => "soft_reconfiguration",
            ActionKind::FailoverPath => "failover_path",
            ActionKind::AdjustBgpWeight => "adjust_bgp_weight",
            ActionKind::EnableCopp => "enable_copp",
            ActionKind::ReduceLogging => "reduce_logging",
            ActionKind::ClearRouteCache => "clear_route_cache",
            ActionKind::ClearArpCache => "clear_arp_cache",
            ActionKind::ShutdownInterface => "shutdown_interface",
            ActionKind::EnableInterface => "enable_interface",
        }
    }

    /// The action that reverts this one, if any.
    pub fn inverse(&self) -> Option<ActionKind> {
        match self {
            ActionKind::ShutdownInterface => Some(ActionKind::EnableInterface),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookAction {
    pub kind: ActionKind,
    /// Command template; lines are separated by `\n`.
    pub command: String,
    pub description: String,
    pub risk: RiskLevel,
}

impl PlaybookAction {
    pub fn new(kind: ActionKind, command: &str, description: &str, risk: RiskLevel) -> Self {
        Self {
            kind,
            command: command.to_string(),
            description: description.to_string(),
            risk,
        }
    }
}

type Row = (ActionKind, &'static str, &'static str, RiskLevel);

const BGP_LINK_FLAP: &[Row] = &[
    (
        ActionKind::AdjustBgpTimers,
        "configure terminal\nrouter bgp\ntimers bgp 60 180",
        "Increase BGP hold timer to reduce flapping sensitivity",
        RiskLevel::Low,
    ),
    (
        ActionKind::ClearInterfaceCounters,
        "clear counters all",
        "Clear interface error counters for baseline",
        RiskLevel::Low,
    ),
];

const BGP_SESSION_INSTABILITY: &[Row] = &[
    (
        ActionKind::ClearBgpSession,
        "clear bgp * all",
        "Clear BGP session to reset neighbor state",
        RiskLevel::Medium,
    ),
    (
        ActionKind::SoftReconfiguration,
        "clear bgp * soft in",
        "Apply soft reconfiguration to refresh routes",
        RiskLevel::Low,
    ),
];

const TRAFFIC_DROP: &[Row] = &[
    (
        ActionKind::FailoverPath,
        "configure terminal\ninterface Ethernet8\nshutdown",
        "Failover traffic to backup ECMP path",
        RiskLevel::Medium,
    ),
    (
        ActionKind::AdjustBgpWeight,
        "configure terminal\nrouter bgp\nneighbor 10.0.0.2 weight 200",
        "Adjust BGP weight to prefer backup path",
        RiskLevel::Low,
    ),
];

const CPU_SPIKE: &[Row] = &[
    (
        ActionKind::EnableCopp,
        "configure terminal\ncopp enable",
        "Enable Control Plane Policing to protect CPU",
        RiskLevel::Low,
    ),
    (
        ActionKind::ReduceLogging,
        "configure terminal\nlogging level warning",
        "Reduce logging verbosity to decrease CPU load",
        RiskLevel::Low,
    ),
];

const MEMORY_EXHAUSTION: &[Row] = &[
    (
        ActionKind::ClearRouteCache,
        "clear ip route cache",
        "Clear route cache to free memory",
        RiskLevel::Low,
    ),
    (
        ActionKind::ClearArpCache,
        "clear arp-cache",
        "Clear ARP cache to free memory",
        RiskLevel::Low,
    ),
];

/// Playbook for `fault`; empty for unknown faults.
pub fn playbook_for(fault: FaultType) -> Vec<PlaybookAction> {
    let rows: &[Row] = match fault {
        FaultType::BgpLinkFlap => BGP_LINK_FLAP,
        FaultType::BgpSessionInstability => BGP_SESSION_INSTABILITY,
        FaultType::TrafficDrop => TRAFFIC_DROP,
        FaultType::CpuSpike => CPU_SPIKE,
        FaultType::MemoryExhaustion => MEMORY_EXHAUSTION,
        FaultType::Unknown => &[],
    };
    rows.iter()
        .map(|&(kind, command, description, risk)| {
            PlaybookAction::new(kind, command, description, risk)
        })
        .collect()
}

/// Interface named in a command template, defaulting to Ethernet8.
pub fn interface_in(command: &str) -> String {
    command
        .lines()
        .find_map(|line| line.trim().strip_prefix("interface "))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_INTERFACE.to_string())
}

/// `(neighbor, weight)` from a `neighbor X weight N` line.
pub fn weight_in(command: &str) -> (String, u32) {
    command
        .lines()
        .find_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next(), words.next(), words.next()) {
                (Some("neighbor"), Some(ip), Some("weight"), Some(w)) => {
                    w.parse().ok().map(|w| (ip.to_string(), w))
                }
                _ => None,
            }
        })
        .unwrap_or_else(|| (DEFAULT_WEIGHT_NEIGHBOR.to_string(), DEFAULT_WEIGHT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_fault_has_two_actions() {
        for fault in FaultType::KNOWN {
            assert_eq!(playbook_for(fault).len(), 2, "{fault}");
        }
        assert!(playbook_for(FaultType::Unknown).is_empty());
    }

    #[test]
    fn test_bgp_link_flap_playbook() {
        let playbook = playbook_for(FaultType::BgpLinkFlap);
        assert_eq!(playbook[0].kind, ActionKind::AdjustBgpTimers);
        assert_eq!(playbook[0].command, "configure terminal\nrouter bgp\ntimers bgp 60 180");
        assert!(playbook.iter().all(|a| a.risk == RiskLevel::Low));
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            interface_in("configure terminal\ninterface Ethernet12\nshutdown"),
            "Ethernet12"
        );
        assert_eq!(interface_in("shutdown"), "Ethernet8");
        assert_eq!(
            weight_in("configure terminal\nrouter bgp\nneighbor 10.0.0.9 weight 50"),
            ("10.0.0.9".to_string(), 50)
        );
        assert_eq!(weight_in("router bgp"), ("10.0.0.2".to_string(), 200));
    }

    #[test]
    fn test_only_shutdown_has_an_inverse() {
        assert_eq!(ActionKind::ShutdownInterface.inverse(), Some(ActionKind::EnableInterface));
        assert_eq!(ActionKind::FailoverPath.inverse(), None);
        assert_eq!(ActionKind::ClearBgpSession.inverse(), None);
    }

    #[test]
    fn test_action_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("reboot_everything"), None);
    }
}
