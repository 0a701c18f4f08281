//! Type definitions shared across the handshake engine

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identity of a simulated node (`"Alice"`, `"Bob"`, ...)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handshake stages, in the only order a session may visit them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Idle,
    SynSent,
    AckObserved,
    KeyMaterialSent,
    SecretDerived,
    Authenticated,
    Failed,
}

impl Stage {
    /// The success path, in order
    pub const SUCCESS_PATH: [Stage; 6] = [
        Stage::Idle,
        Stage::SynSent,
        Stage::AckObserved,
        Stage::KeyMaterialSent,
        Stage::SecretDerived,
        Stage::Authenticated,
    ];

    /// The stage that must follow this one on the success path
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::SynSent),
            Stage::SynSent => Some(Stage::AckObserved),
            Stage::AckObserved => Some(Stage::KeyMaterialSent),
            Stage::KeyMaterialSent => Some(Stage::SecretDerived),
            Stage::SecretDerived => Some(Stage::Authenticated),
            Stage::Authenticated | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Authenticated | Stage::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::SynSent => "SynSent",
            Stage::AckObserved => "AckObserved",
            Stage::KeyMaterialSent => "KeyMaterialSent",
            Stage::SecretDerived => "SecretDerived",
            Stage::Authenticated => "Authenticated",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directed link label used as a latency-record key, rendered `"from<->to"`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkLabel {
    pub from: NodeId,
    pub to: NodeId,
}

impl LinkLabel {
    pub fn new(from: &NodeId, to: &NodeId) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
        }
    }
}

impl fmt::Display for LinkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.from, self.to)
    }
}

impl Serialize for LinkLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Session-progress markers
///
/// Only `SYN` travels over the channel; the rest mark progress in the logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlToken {
    Syn,
    Ack,
    Ready,
    SendPk,
    SendCt,
    Done,
}

impl ControlToken {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlToken::Syn => "SYN",
            ControlToken::Ack => "ACK",
            ControlToken::Ready => "READY",
            ControlToken::SendPk => "SEND_PK",
            ControlToken::SendCt => "SEND_CT",
            ControlToken::Done => "DONE",
        }
    }
}

impl fmt::Display for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlToken {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYN" => Ok(ControlToken::Syn),
            "ACK" => Ok(ControlToken::Ack),
            "READY" => Ok(ControlToken::Ready),
            "SEND_PK" => Ok(ControlToken::SendPk),
            "SEND_CT" => Ok(ControlToken::SendCt),
            "DONE" => Ok(ControlToken::Done),
            _ => Err(()),
        }
    }
}
