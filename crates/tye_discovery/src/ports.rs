//! Listening TCP ports per process, read from the platform's own tools.

use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait PortLister: Send + Sync {
    /// Listening ports of `pid`, deduplicated; empty on any failure.
    async fn listening_ports(&self, pid: u32) -> Vec<u16>;
}

/// `lsof` on unix, `netstat -ano` on windows.
#[derive(Debug, Default, Clone)]
pub struct SystemPortLister;

impl SystemPortLister {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PortLister for SystemPortLister {
    async fn listening_ports(&self, pid: u32) -> Vec<u16> {
        read_ports(listing_command(pid), pid).await
    }
}

fn listing_command(pid: u32) -> Command {
    if cfg!(windows) {
        let mut command = Command::new("netstat");
        command.args(["-ano", "-p", "tcp"]);
        command
    } else {
        let mut command = Command::new("lsof");
        command.args(["-Pn", "-iTCP", "-sTCP:LISTEN", "-a", "-p", &pid.to_string()]);
        command
    }
}

async fn read_ports(mut command: Command, pid: u32) -> Vec<u16> {
    let output = match command.kill_on_drop(true).output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("Port listing for pid {} failed: {}", pid, e);
            return Vec::new();
        }
    };

    // lsof exits 1 when nothing matches; the output is still authoritative.
    let stdout = String::from_utf8_lossy(&output.stdout);
    if cfg!(windows) {
        parse_netstat(&stdout, pid)
    } else {
        parse_lsof(&stdout)
    }
}

fn port_after_last_colon(address: &str) -> Option<u16> {
    address.rsplit_once(':')?.1.parse().ok()
}

fn push_unique(ports: &mut Vec<u16>, port: u16) {
    if !ports.contains(&port) {
        ports.push(port);
    }
}

/// Parses `lsof -Pn -iTCP -sTCP:LISTEN` rows, e.g.
/// `dotnet 4242 dev 210u IPv4 0x1 0t0 TCP 127.0.0.1:5000 (LISTEN)`.
pub fn parse_lsof(output: &str) -> Vec<u16> {
    let mut ports = Vec::new();

    for line in output.lines().skip(1) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 9 || columns[7] != "TCP" {
            continue;
        }

        if let Some(port) = port_after_last_colon(columns[8]) {
            push_unique(&mut ports, port);
        }
    }

    ports
}

/// Parses `netstat -ano -p tcp` rows belonging to `pid`, e.g.
/// `TCP    0.0.0.0:5000    0.0.0.0:0    LISTENING    4242`.
pub fn parse_netstat(output: &str, pid: u32) -> Vec<u16> {
    let mut ports = Vec::new();

    for line in output.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [protocol, local, _, state, owner] = columns[..] else {
            continue;
        };

        if !protocol.eq_ignore_ascii_case("TCP") || state != "LISTENING" {
            continue;
        }
        if owner.parse::<u32>().ok() != Some(pid) {
            continue;
        }

        if let Some(port) = port_after_last_colon(local) {
            push_unique(&mut ports, port);
        }
    }

    ports
}
