//! Live SONiC device access through `vtysh`, locally or over ssh.

use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandOutput, DeviceCommand, DeviceCommandKind, ToolHealth};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SonicCli {
    device_ip: Option<String>,
    timeout: Duration,
}

impl SonicCli {
    pub fn new(device_ip: Option<String>) -> Self {
        Self {
            device_ip,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Program and arguments for one command. Each line becomes its own
    /// `-c` so configuration sequences run in a single vtysh session.
    fn invocation(&self, cli: &str) -> (String, Vec<String>) {
        let lines = cli.lines().map(str::trim).filter(|l| !l.is_empty());
        match &self.device_ip {
            Some(ip) => {
                let mut args = vec![format!("admin@{ip}"), "vtysh".to_string()];
                for line in lines {
                    args.push("-c".into());
                    // ssh hands the remote side a single shell string.
                    args.push(format!("'{}'", line.replace('\'', r"'\''")));
                }
                ("ssh".into(), args)
            }
            None => {
                let args = lines.flat_map(|l| ["-c".to_string(), l.to_string()]).collect();
                ("vtysh".into(), args)
            }
        }
    }

    /// Run `cli` under the command timeout. Spawn failures and timeouts
    /// come back as failed outputs.
    async fn run(&self, device_id: &str, cli: &str) -> CommandOutput {
        let (program, args) = self.invocation(cli);
        debug!(%device_id, %program, ?args, "running device command");

        let run = Command::new(&program).args(&args).kill_on_drop(true).output();
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(%device_id, error = %e, "failed to spawn {}", program);
                return CommandOutput::failed(e.to_string());
            }
            Err(_) => return CommandOutput::failed("Command timeout"),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            CommandOutput::ok(stdout)
        } else {
            CommandOutput {
                success: false,
                output: stdout,
                error: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            }
        }
    }
}

#[async_trait::async_trait]
impl DeviceCommand for SonicCli {
    async fn execute(&self, device_id: &str, command: &DeviceCommandKind) -> Result<CommandOutput> {
        Ok(self.run(device_id, &command.to_cli()).await)
    }

    async fn health(&self) -> ToolHealth {
        let target = self.device_ip.as_deref().unwrap_or("localhost");
        let output = self.run(target, "show version").await;
        if output.success {
            ToolHealth::connected("SONiC management active")
        } else {
            ToolHealth::disconnected(output.error.unwrap_or_else(|| "show version failed".into()))
        }
    }
}
