use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netheal::config::{HealConfig, LoggingConfig};
use netheal::incident::{DeviceRef, FaultType, Incident, IncidentReport, Severity};
use netheal::tools::Toolset;

#[derive(Parser)]
#[command(
    name = "netheal",
    about = "Autonomous incident healing for SONiC network fabrics",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: $NETHEAL_CONFIG, then /etc/netheal/netheal.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + worker pool)
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one incident through the healing pipeline and print the result
    Trigger {
        #[arg(long)]
        device_id: String,

        #[arg(long)]
        device_name: String,

        /// core, spine, tor, dpu...
        #[arg(long, default_value = "unknown")]
        device_type: String,

        /// bgp_link_flap, bgp_session_instability, traffic_drop, cpu_spike,
        /// memory_exhaustion
        #[arg(long)]
        fault: FaultType,

        #[arg(long, default_value = "medium")]
        severity: Severity,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List supported fault types and collaborator modes
    Capabilities {
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &IncidentReport) {
    println!("\nnetheal incident {}", report.incident_id);
    println!("{:<22} | {}", "Device", report.device_name);
    println!("{:<22} | {}", "Stage", report.stage);
    println!("{:<22} | {} (claimed {})", "Fault", report.fault_type, report.claimed_fault);
    println!("{:<22} | {:.2}", "Detection confidence", report.detection_confidence);
    println!("{:<22} | {}", "Root cause", report.root_cause);
    println!(
        "{:<22} | {:.2} ({} risk)",
        "RCA confidence", report.rca_confidence, report.remediation_risk
    );
    println!("{:<22} | {}", "Verification passed", report.verification_passed);
    println!("{:<22} | {}", "Retries", report.retry_count);
    println!("{:<22} | {:.2}s", "Total time", report.timing.total);
    if let Some(err) = &report.error {
        println!("{:<22} | {}", "Error", err);
    }

    if !report.actions.is_empty() {
        println!("\n{:<24} | {:<8} | Description", "Action", "Result");
        println!("{:-<24}-|-{:-<8}-|-{:-<40}", "", "", "");
        for action in &report.actions {
            let result = if action.success { "OK" } else { "FAILED" };
            println!("{:<24} | {:<8} | {}", action.action_type, result, action.description);
        }
    }

    println!("\n=== Timeline ===");
    for event in &report.events {
        println!(
            "{} {:<13} {:?}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.stage.to_string(),
            event.action
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HealConfig::discover(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting netheal daemon");
            netheal::serve(config).await?;
        }
        Commands::Trigger {
            device_id,
            device_name,
            device_type,
            fault,
            severity,
            json,
        } => {
            let orchestrator = netheal::orchestrator(&config)?;
            let device = DeviceRef {
                id: device_id,
                name: device_name,
                device_type,
            };
            let incident = Incident::new(Incident::generate_id(), device, fault, severity);
            let report = IncidentReport::from(orchestrator.run(incident).await);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Capabilities { json } => {
            let tools = Toolset::describe(&config.tools);
            if json {
                let body = serde_json::json!({
                    "fault_types": FaultType::KNOWN,
                    "tools": tools,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Supported fault types:");
                for fault in FaultType::KNOWN {
                    println!("  {fault}");
                }
                println!("\nCollaborators:");
                for name in ["prometheus", "gns3", "sonic"] {
                    println!("  {:<12} {}", name, tools[name].as_str().unwrap_or("unknown"));
                }
            }
        }
    }

    Ok(())
}
