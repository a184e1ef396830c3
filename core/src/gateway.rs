//! Enforcement-plane boundary.
//!
//! The plane is eventually consistent relative to the local ledger:
//! every call is best-effort, independently idempotent, and
//! independently fallible. The engine inspects failures, logs them, and
//! moves on; nothing here may decide the fate of a run.

use crate::account::Account;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed node response: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Node rejected {op} for \"{username}\": {reason}")]
    Rejected {
        op: &'static str,
        username: String,
        reason: String,
    },
}

pub trait EnforcementGateway {
    fn add(&self, account: &Account) -> Result<(), GatewayError>;
    fn remove(&self, account: &Account) -> Result<(), GatewayError>;
    fn update(&self, account: &Account) -> Result<(), GatewayError>;
}

/// Gateway used when no enforcement plane is attached.
pub struct NullGateway;

impl EnforcementGateway for NullGateway {
    fn add(&self, _account: &Account) -> Result<(), GatewayError> {
        Ok(())
    }
    fn remove(&self, _account: &Account) -> Result<(), GatewayError> {
        Ok(())
    }
    fn update(&self, _account: &Account) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum NodeCommand<'a> {
    Add { account: &'a Account },
    Remove { username: &'a str },
    Update { account: &'a Account },
}

#[derive(Deserialize)]
struct NodeAck {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Newline-delimited JSON command protocol against a single node.
///
/// One connection per call: calls are synchronous and individually
/// fault-isolated, so a dead node costs one timeout, not the run.
pub struct TcpGateway {
    addr: String,
    timeout: Duration,
}

impl TcpGateway {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, Duration::from_secs(3))
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    fn send(
        &self,
        op: &'static str,
        username: &str,
        command: &NodeCommand<'_>,
    ) -> Result<(), GatewayError> {
        let addr = self
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}", self.addr),
                )
            })?;
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut line = serde_json::to_string(command)?;
        line.push('\n');
        stream.write_all(line.as_bytes())?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        let ack: NodeAck = serde_json::from_str(&response)?;
        if ack.ok {
            Ok(())
        } else {
            Err(GatewayError::Rejected {
                op,
                username: username.to_string(),
                reason: ack.error.unwrap_or_else(|| "unspecified".into()),
            })
        }
    }
}

impl EnforcementGateway for TcpGateway {
    fn add(&self, account: &Account) -> Result<(), GatewayError> {
        self.send("add", &account.username, &NodeCommand::Add { account })
    }

    fn remove(&self, account: &Account) -> Result<(), GatewayError> {
        self.send(
            "remove",
            &account.username,
            &NodeCommand::Remove {
                username: &account.username,
            },
        )
    }

    fn update(&self, account: &Account) -> Result<(), GatewayError> {
        self.send("update", &account.username, &NodeCommand::Update { account })
    }
}
